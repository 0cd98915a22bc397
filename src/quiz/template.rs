/// Substitutes `{name}` placeholders with their bound values.
///
/// Only the names present in `bindings` are recognised. Anything else,
/// including unterminated braces, is copied through literally.
pub fn render(template: &str, bindings: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let close = match after.find('}') {
            Some(close) => close,
            None => {
                out.push_str(&rest[open..]);
                return out;
            }
        };

        let name = &after[..close];
        match bindings.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                // keep the brace and rescan, `name` may hold another `{`
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::render;

    #[test]
    fn substitutes_known_placeholders() {
        let text = render(
            "You scored {score} of {q_total}!",
            &[("score", "7"), ("q_total", "10")],
        );
        assert_eq!(text, "You scored 7 of 10!");
    }

    #[test]
    fn repeated_placeholders_are_all_replaced() {
        assert_eq!(render("{score}/{score}", &[("score", "3")]), "3/3");
    }

    #[test]
    fn unknown_placeholders_stay_literal() {
        assert_eq!(
            render("{name}, you got {score}", &[("score", "1")]),
            "{name}, you got 1"
        );
    }

    #[test]
    fn unbalanced_braces_are_kept() {
        assert_eq!(render("a { b {score}", &[("score", "2")]), "a { b 2");
        assert_eq!(render("tail {score", &[("score", "2")]), "tail {score");
        assert_eq!(render("}{}", &[]), "}{}");
    }
}
