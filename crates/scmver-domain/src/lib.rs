#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod dist_name;
pub mod schemes;
pub mod scm_version;
pub mod tag_parse;
pub mod version_cls;

pub use dist_name::{canonicalize_name, env_var_dist_name};
pub use schemes::{
    format_version, resolve_local_scheme, resolve_version_scheme, LocalScheme, SchemeContext,
    VersionScheme, DEFAULT_LOCAL_SCHEME, DEFAULT_VERSION_SCHEME,
};
pub use scm_version::{ScmVersion, ScmVersionBuilder};
pub use tag_parse::{
    check_tag_regex, parse_version_tag, tag_to_version, TagMatch, TagParseError,
    DEFAULT_TAG_REGEX,
};
pub use version_cls::{strip_dev_and_local, version_as_tuple, TagVersion, TuplePart};
