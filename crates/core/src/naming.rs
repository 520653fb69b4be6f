//! Alias names derived from type names
//!
//! `Foo::BarBaz` becomes `bar_baz`: the module path is dropped and the
//! remaining CamelCase word is converted to snake_case.

/// Derive an alias name from a (possibly path-qualified) type name.
///
/// Generic arguments are ignored, so `std::any::type_name::<T>()` can be
/// passed directly.
///
/// # Example
///
/// ```
/// use elastic_core::to_alias_name;
///
/// assert_eq!(to_alias_name("Foo::BarBaz"), "bar_baz");
/// assert_eq!(to_alias_name("shop::HTMLPage"), "html_page");
/// ```
pub fn to_alias_name(type_name: &str) -> String {
    underscore(demodulize(type_name))
}

fn demodulize(path: &str) -> &str {
    let path = match path.find('<') {
        Some(i) => &path[..i],
        None => path,
    };
    match path.rfind("::") {
        Some(i) => &path[i + 2..],
        None => path,
    }
}

fn underscore(word: &str) -> String {
    if !word.chars().any(|c| c.is_ascii_uppercase() || c == '-') {
        return word.to_string();
    }

    let chars: Vec<char> = word.chars().collect();
    let mut out = String::with_capacity(word.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let after_lower = prev.is_ascii_lowercase() || prev.is_ascii_digit();
            let ends_acronym = (prev.is_ascii_uppercase() || prev.is_ascii_digit())
                && next.is_some_and(|n| n.is_ascii_lowercase());
            if after_lower || ends_acronym {
                out.push('_');
            }
        }
        out.push(if c == '-' { '_' } else { c.to_ascii_lowercase() });
    }

    out
}
