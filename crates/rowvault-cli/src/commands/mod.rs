pub mod estimate_cost;
pub mod restore;
pub mod run;
pub mod validate_config;
