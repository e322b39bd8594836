pub mod actor;
pub mod courier;
pub mod location;
pub mod request;
