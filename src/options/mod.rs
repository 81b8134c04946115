/// Options files and middleware resolution
///
/// Options come from layered `_options.yml` files. Top-level keys are either
/// reserved (`middleware`, `find_by`, `require`) or attribute names that map
/// to per-attribute options such as `multiline` and `middleware`.

mod resolve;
mod spec;
mod tree;

pub use resolve::{OptionsResolver, ResolvedOptions};
pub use spec::MiddlewareSpec;
pub use tree::{
    is_multiline, merge, AttributeOptions, FindBy, OptionsTree, Require, DEFAULT_FIND_BY,
    FIND_BY_KEY, MIDDLEWARE_KEY, MULTILINE_KEY, REQUIRE_KEY,
};
