pub mod job;
pub mod scrape_config;
pub mod scraping_task;
pub mod store_connection;
