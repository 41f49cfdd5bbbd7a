//! The chunked storage core: splitting and sniffing on the way in, access
//! control, reconciliation and reassembly on the way out.

pub mod access;
pub mod file_service;
pub mod links;
pub mod reader;
pub mod reassembler;
pub mod reconciler;
pub mod sniffer;
pub mod splitter;
pub mod upload;

pub use file_service::FileService;
