pub mod builder;
pub mod types;

pub use builder::{
    build_create, build_list, build_orchestration, build_output_query, build_start,
    build_status_query, sanitize_dependencies,
};
pub use types::*;
