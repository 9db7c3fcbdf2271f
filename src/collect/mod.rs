pub mod cache;
pub mod client;
pub mod collector;
pub mod post_process;

pub use cache::ResponseCache;
pub use client::{FetchError, HttpTransport, Transport};
pub use collector::{CollectMeta, CollectOptions, CollectService, Collection};
pub use post_process::PostProcess;
