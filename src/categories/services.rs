/// URL-safe slug: lowercase ASCII alphanumerics with single dashes between
/// words. "Samsung Mobile!" becomes "samsung-mobile".
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_separators() {
        assert_eq!(slugify("Samsung Mobile"), "samsung-mobile");
        assert_eq!(slugify("  Home & Kitchen  "), "home-kitchen");
        assert_eq!(slugify("T-Shirts__XL"), "t-shirts-xl");
    }

    #[test]
    fn drops_non_ascii() {
        assert_eq!(slugify("Café Décor"), "caf-d-cor");
        assert_eq!(slugify("!!!"), "");
    }
}
