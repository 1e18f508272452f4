pub mod resolve_cache;

pub use resolve_cache::ResolveCache;
