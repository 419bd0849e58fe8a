mod about_json;
mod index_json;
mod paths_json;
mod run_exports_json;

pub use about_json::AboutJson;
pub use index_json::IndexJson;
pub use paths_json::{FileMode, PathType, PathsEntry, PathsJson, PostInstall};
pub use run_exports_json::RunExportsJson;
