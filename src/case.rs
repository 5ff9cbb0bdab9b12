//! Naming conventions for generated API: type names, shape names, operation names.

/// Identifier rule shared by class, object, enum, scalar and field names: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Uppercase the first character, leave the rest untouched.
/// e.g. "signIn" -> "SignIn"
pub fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Shape name of the default input for an object: "Person" -> "PersonInput".
pub fn input_name(object: &str) -> String {
    format!("{}Input", object)
}

/// Shape name of the filter for an object: "Person" -> "PersonWhereInput".
pub fn where_name(object: &str) -> String {
    format!("{}WhereInput", object)
}

/// Shape name of the operator set for a scalar or enum leaf: "Int" -> "IntWhereInput".
pub fn leaf_where_name(type_name: &str, list: bool) -> String {
    if list {
        format!("{}ListWhereInput", type_name)
    } else {
        format!("{}WhereInput", type_name)
    }
}

/// Wrapper input names for generated mutations, e.g. ("Person", "Create", false) -> "PersonCreateInput"
/// and ("Person", "Create", true) -> "PersonsCreateInput".
pub fn mutation_input_name(class: &str, verb: &str, many: bool) -> String {
    if many {
        format!("{}s{}Input", class, verb)
    } else {
        format!("{}{}Input", class, verb)
    }
}

/// Input shape of a custom mutation: "sumAndUpdate" -> "SumAndUpdateInput".
pub fn custom_input_name(resolver: &str) -> String {
    format!("{}Input", upper_first(resolver))
}
