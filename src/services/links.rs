//! Public share addresses: `<origin>/share/<id>`.

const SHARE_SEGMENT: &str = "/share/";

#[derive(Clone, Debug)]
pub struct ShareLinks {
    origin: String,
}

impl ShareLinks {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn link(&self, id: &str) -> String {
        format!("{}{}{}", self.origin, SHARE_SEGMENT, id)
    }

    /// Extract the identifier from a link produced by [`ShareLinks::link`].
    pub fn parse<'a>(&self, url: &'a str) -> Option<&'a str> {
        let id = url
            .strip_prefix(self.origin.as_str())?
            .strip_prefix(SHARE_SEGMENT)?;
        (!id.is_empty() && !id.contains('/')).then_some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_round_trip_through_origin() {
        let links = ShareLinks::new("https://files.example.com/");
        let url = links.link("cat.png_17");
        assert_eq!(url, "https://files.example.com/share/cat.png_17");
        assert_eq!(links.parse(&url), Some("cat.png_17"));
        assert_eq!(links.parse("https://other.example/share/x"), None);
        assert_eq!(links.parse("https://files.example.com/share/"), None);
    }
}
