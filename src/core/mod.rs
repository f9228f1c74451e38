pub mod proxy;
pub mod rules;
pub mod selector;
pub mod target;
pub mod target_group;

pub use proxy::ProxyService;
pub use selector::Selector;
