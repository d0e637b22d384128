//! Registry of built-in functions known to this build.
//!
//! Only the signature surface matters here (name, arity, infix form, deprecation); the
//! compiler never evaluates a built-in.

/// Static description of a built-in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuiltinSpec {
    pub name: &'static str,
    /// Fixed argument count. Ignored when `variadic`.
    pub arity: usize,
    pub variadic: bool,
    pub infix: Option<&'static str>,
    pub deprecated: bool,
}

const fn f(name: &'static str, arity: usize) -> BuiltinSpec {
    BuiltinSpec {
        name,
        arity,
        variadic: false,
        infix: None,
        deprecated: false,
    }
}

const fn op(name: &'static str, arity: usize, infix: &'static str) -> BuiltinSpec {
    BuiltinSpec {
        name,
        arity,
        variadic: false,
        infix: Some(infix),
        deprecated: false,
    }
}

const fn old(name: &'static str, arity: usize) -> BuiltinSpec {
    BuiltinSpec {
        name,
        arity,
        variadic: false,
        infix: None,
        deprecated: true,
    }
}

pub const PRINT: &str = "print";

pub const EQUAL: &str = "equal";
pub const NEQ: &str = "neq";
pub const LT: &str = "lt";
pub const LTE: &str = "lte";
pub const GT: &str = "gt";
pub const GTE: &str = "gte";
pub const PLUS: &str = "plus";
pub const MINUS: &str = "minus";
pub const MUL: &str = "mul";
pub const DIV: &str = "div";
pub const REM: &str = "rem";
pub const OR: &str = "or";
pub const AND: &str = "and";
pub const MEMBER: &str = "internal.member_2";

static REGISTRY: &[BuiltinSpec] = &[
    // operators
    op(EQUAL, 2, "=="),
    op(NEQ, 2, "!="),
    op(LT, 2, "<"),
    op(LTE, 2, "<="),
    op(GT, 2, ">"),
    op(GTE, 2, ">="),
    op(PLUS, 2, "+"),
    op(MINUS, 2, "-"),
    op(MUL, 2, "*"),
    op(DIV, 2, "/"),
    op(REM, 2, "%"),
    op(OR, 2, "|"),
    op(AND, 2, "&"),
    op(MEMBER, 2, "in"),
    op("internal.member_3", 3, "in"),
    // aggregates
    f("count", 1),
    f("sum", 1),
    f("product", 1),
    f("max", 1),
    f("min", 1),
    f("sort", 1),
    old("all", 1),
    old("any", 1),
    // arrays and sets
    f("array.concat", 2),
    f("array.slice", 3),
    f("array.reverse", 1),
    f("intersection", 1),
    f("union", 1),
    old("set_diff", 2),
    // strings
    f("concat", 2),
    f("contains", 2),
    f("endswith", 2),
    f("startswith", 2),
    f("format_int", 2),
    f("indexof", 2),
    f("lower", 1),
    f("upper", 1),
    f("replace", 3),
    f("split", 2),
    f("sprintf", 2),
    f("substring", 3),
    f("trim", 2),
    f("trim_space", 1),
    f("trim_prefix", 2),
    f("trim_suffix", 2),
    f("strings.replace_n", 2),
    f("strings.reverse", 1),
    // regex and glob
    f("regex.match", 2),
    old("re_match", 2),
    f("regex.split", 2),
    f("regex.find_n", 3),
    f("glob.match", 3),
    // types
    f("is_number", 1),
    f("is_string", 1),
    f("is_boolean", 1),
    f("is_array", 1),
    f("is_set", 1),
    f("is_object", 1),
    f("is_null", 1),
    f("type_name", 1),
    f("to_number", 1),
    old("cast_array", 1),
    old("cast_set", 1),
    old("cast_string", 1),
    // objects
    f("object.get", 3),
    f("object.keys", 1),
    f("object.remove", 2),
    f("object.union", 2),
    f("object.filter", 2),
    f("json.filter", 2),
    f("json.remove", 2),
    // encoding
    f("json.marshal", 1),
    f("json.unmarshal", 1),
    f("json.is_valid", 1),
    f("base64.encode", 1),
    f("base64.decode", 1),
    f("yaml.marshal", 1),
    f("yaml.unmarshal", 1),
    f("urlquery.encode", 1),
    // numbers
    f("abs", 1),
    f("round", 1),
    f("ceil", 1),
    f("floor", 1),
    f("numbers.range", 2),
    f("rand.intn", 2),
    // time
    f("time.now_ns", 0),
    f("time.parse_rfc3339_ns", 1),
    f("time.date", 1),
    f("time.add_date", 4),
    // net and crypto
    f("net.cidr_contains", 2),
    old("net.cidr_overlap", 2),
    f("crypto.sha256", 1),
    f("io.jwt.decode", 1),
    // misc
    f("walk", 1),
    f("trace", 1),
    f("http.send", 1),
    f("opa.runtime", 0),
    f("uuid.rfc4122", 1),
    f("units.parse_bytes", 1),
    BuiltinSpec {
        name: PRINT,
        arity: 0,
        variadic: true,
        infix: None,
        deprecated: false,
    },
];

pub fn registry() -> &'static [BuiltinSpec] {
    REGISTRY
}

pub fn lookup(name: &str) -> Option<&'static BuiltinSpec> {
    REGISTRY.iter().find(|b| b.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn names_are_unique() {
        let names: BTreeSet<&str> = registry().iter().map(|b| b.name).collect();
        assert_eq!(names.len(), registry().len());
    }

    #[test]
    fn operators_resolve() {
        assert_eq!(lookup(EQUAL).and_then(|b| b.infix), Some("=="));
        assert_eq!(lookup(MEMBER).map(|b| b.arity), Some(2));
        assert!(lookup("any").is_some_and(|b| b.deprecated));
        assert!(lookup(PRINT).is_some_and(|b| b.variadic));
    }
}
