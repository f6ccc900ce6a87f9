//! Concrete collaborator for snapslot: drives a remote browser-automation
//! service over JSON/HTTP.

pub mod remote;

pub use remote::RemoteBrowser;
