//! Policy stack (spec.md §4.3): URL guard, launch-argument allow/block,
//! downloads-path guard, selector guard, credential redaction, scope check.
//! Run by the dispatcher in front of every handler.

mod launch_args;
mod path_guard;
mod redaction;
mod scope;
mod selector_guard;
mod url_guard;

pub use launch_args::{validate_launch_args, LaunchArgPolicy};
pub use path_guard::{validate_downloads_path, PathGuardConfig};
pub use redaction::{is_sensitive_element, redact_html};
pub use scope::{required_scopes_for, scope_allows, ScopeError};
pub use selector_guard::validate_selector_value;
pub use url_guard::{validate_navigation_url, UrlGuardConfig};
