//! Host resources touched by a connection attempt

pub mod credentials;
pub mod diagnostics;
pub mod hosts;
pub mod interface;

pub use credentials::CredentialFile;
pub use diagnostics::Diagnostics;
pub use hosts::HostsManager;
pub use interface::{InterfaceAllocator, InterfaceHandle};
