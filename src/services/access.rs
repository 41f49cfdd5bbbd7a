//! Visibility rule for reading stored objects.
//!
//! The owner can always read; everyone else only after the object has been
//! published. The same rule gates recording a download.

use crate::{
    errors::{ShareError, ShareResult},
    models::{FileObject, Principal},
};

pub fn can_read(caller: &Principal, object: &FileObject) -> bool {
    is_owner(caller, &object.owner) || object.is_shared
}

pub fn is_owner(caller: &Principal, owner: &Principal) -> bool {
    !caller.is_anonymous() && caller == owner
}

/// Turn a negative [`can_read`] into `PermissionDenied`.
pub fn authorize(caller: &Principal, object: &FileObject) -> ShareResult<()> {
    if can_read(caller, object) {
        Ok(())
    } else {
        Err(ShareError::PermissionDenied(object.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn object(owner: &str, is_shared: bool) -> FileObject {
        FileObject {
            id: "x_1".into(),
            filename: "x".into(),
            content_type: "image/png".into(),
            owner: Principal::new(owner),
            size: 0,
            chunk_count: 1,
            uploaded: Utc::now(),
            download_count: 0,
            is_shared,
            finalized: true,
        }
    }

    #[test]
    fn test_visibility_matrix() {
        let owner = Principal::new("alice");
        let other = Principal::new("bob");
        let anon = Principal::anonymous();

        assert!(!can_read(&other, &object("alice", false)));
        assert!(can_read(&other, &object("alice", true)));
        assert!(can_read(&owner, &object("alice", false)));
        assert!(can_read(&owner, &object("alice", true)));
        assert!(!can_read(&anon, &object("alice", false)));
        assert!(can_read(&anon, &object("alice", true)));
    }

    #[test]
    fn test_anonymous_never_owns() {
        assert!(!is_owner(&Principal::anonymous(), &Principal::anonymous()));
        assert!(matches!(
            authorize(&Principal::new("bob"), &object("alice", false)),
            Err(ShareError::PermissionDenied(id)) if id == "x_1"
        ));
    }
}
