pub mod connectivity;
pub mod offline_store;
pub mod query_cache;
pub mod remote_data_api;
