use proc_macro::TokenStream;

mod config;
mod lifecycle;

/// Derive macro describing a configuration type
///
/// Every field carrying `#[config(name = "...")]` becomes a configuration
/// attribute with a `get_<field>` getter and a marked `set_<field>` setter.
/// The type must implement `Default`, which serves as its no-arg constructor.
/// `legacy = "..."` (repeatable) keeps accepting a former property name and
/// the struct-level `defunct = [...]` rejects properties that were removed.
///
/// # Example
/// ```ignore
/// use keystone::Config;
///
/// #[derive(Default, Config)]
/// #[config(defunct = ["http.threads"])]
/// pub struct HttpConfig {
///     #[config(name = "http.port", description = "listen port", legacy = "port", required)]
///     port: i32,
///
///     #[config(name = "http.host", default_value = "0.0.0.0")]
///     host: String,
///
///     #[config(name = "http.token", sensitive)]
///     token: String,
/// }
/// ```
#[proc_macro_derive(Config, attributes(config))]
pub fn derive_config(input: TokenStream) -> TokenStream {
    config::derive_config(input)
}

/// Attribute macro declaring lifecycle hooks in an impl block
///
/// Methods marked `#[post_construct]` run when the instance is added to the
/// lifecycle manager; methods marked `#[pre_destroy]` run when it stops.
/// Hooks take `&self` and no other argument, and return `()` or a `Result`.
///
/// # Example
/// ```ignore
/// #[lifecycle]
/// impl Database {
///     #[post_construct]
///     fn connect(&self) -> anyhow::Result<()> { ... }
///
///     #[pre_destroy]
///     fn close(&self) { ... }
/// }
/// ```
#[proc_macro_attribute]
pub fn lifecycle(attr: TokenStream, item: TokenStream) -> TokenStream {
    lifecycle::lifecycle_attribute(attr, item)
}

/// Marks a start hook inside a `#[lifecycle]` impl block
#[proc_macro_attribute]
pub fn post_construct(_attr: TokenStream, item: TokenStream) -> TokenStream {
    // Pass-through, actual handling is done by #[lifecycle] macro
    item
}

/// Marks a stop hook inside a `#[lifecycle]` impl block
#[proc_macro_attribute]
pub fn pre_destroy(_attr: TokenStream, item: TokenStream) -> TokenStream {
    // Pass-through, actual handling is done by #[lifecycle] macro
    item
}
