//! Stable diagnostic codes.
//!
//! These strings are part of the JSON output contract; downstream scripts match on them.

pub const CODE_PARSE_ERROR: &str = "rego_parse_error";
pub const CODE_COMPILE_ERROR: &str = "rego_compile_error";
pub const CODE_TYPE_ERROR: &str = "rego_type_error";
pub const CODE_UNSAFE_VAR_ERROR: &str = "rego_unsafe_var_error";
pub const CODE_RECURSION_ERROR: &str = "rego_recursion_error";

/// Every code the compiler and parser can emit, in a stable order.
pub fn all_codes() -> &'static [&'static str] {
    &[
        CODE_PARSE_ERROR,
        CODE_COMPILE_ERROR,
        CODE_TYPE_ERROR,
        CODE_UNSAFE_VAR_ERROR,
        CODE_RECURSION_ERROR,
    ]
}
