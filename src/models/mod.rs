pub mod credential;
pub mod proxy;
