/// String utilities for parsing and displaying humanly readable values.
pub fn to_human_readable_string(value: impl Into<String>) -> String {
    value
        .into()
        .chars()
        .fold(String::new(), |mut acc, c| {
            // Convert camelCase to space-separated words.
            if c.is_uppercase() {
                acc.push(' ');
            }

            // Element identifiers are snake_case.
            if c == '_' {
                acc.push(' ');
                return acc;
            }

            acc.push(c);
            acc
        })
        .split(' ')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_readable_identifiers() {
        assert_eq!(to_human_readable_string("given_name"), "Given Name");
        assert_eq!(to_human_readable_string("age_over_18"), "Age Over 18");
        assert_eq!(to_human_readable_string("issuingCountry"), "Issuing Country");
        assert_eq!(to_human_readable_string("_leading"), "Leading");
    }
}
