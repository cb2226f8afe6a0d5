pub mod crawl;
pub mod http;
pub mod sink;
