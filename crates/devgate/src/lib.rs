pub mod agent;
pub mod approval;
pub mod checkpoint;
pub mod context;
pub mod diff;
pub mod errors;
pub mod models;
pub mod policy;
pub mod prompt_template;
pub mod providers;
pub mod registry;
pub mod reporter;
pub mod schema;
pub mod state;
pub mod tools;
