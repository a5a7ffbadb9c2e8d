pub mod agent;
pub mod analyst;
pub mod conversation;
pub mod documents;
pub mod errors;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod tools;
