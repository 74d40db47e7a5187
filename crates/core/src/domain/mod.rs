pub mod article_template;
pub mod client;
pub mod offer;
pub mod signature;
pub mod template;
pub mod version;
