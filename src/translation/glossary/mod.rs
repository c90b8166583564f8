//! 术语库：读取接口、组合器与激活过滤

pub mod activation;
pub mod composer;
pub mod store;
pub mod util;

pub use activation::TermActivationFilter;
pub use composer::GlossaryComposer;
pub use store::{GlossaryStore, InMemoryGlossaryStore, RecallOptions};
pub use util::{detect_script_kind, ScriptKind};
