use serde::{Deserialize, Deserializer, Serialize};

/// One generated candidate test case.
///
/// Scenario files are written by a language model and served raw, so the
/// text fields are lenient: `steps` arrives as one string or a list and is
/// normalised to a list, `preconditions` and `expected_results` accept a list
/// and are joined into one string, and a null `title` reads as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "text_from_text_or_list", skip_serializing_if = "Option::is_none")]
    pub preconditions: Option<String>,
    #[serde(default, deserialize_with = "steps_from_text_or_list")]
    pub steps: Vec<String>,
    #[serde(default, deserialize_with = "text_from_text_or_list", skip_serializing_if = "Option::is_none")]
    pub expected_results: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrList {
    Text(String),
    List(Vec<String>),
}

fn steps_from_text_or_list<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<TextOrList>::deserialize(de)? {
        None => Vec::new(),
        Some(TextOrList::Text(s)) if s.trim().is_empty() => Vec::new(),
        Some(TextOrList::Text(s)) => vec![s],
        Some(TextOrList::List(v)) => v,
    })
}

fn text_from_text_or_list<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    let text = match Option::<TextOrList>::deserialize(de)? {
        None => return Ok(None),
        Some(TextOrList::Text(s)) => s,
        Some(TextOrList::List(v)) => v.join("; "),
    };
    Ok((!text.trim().is_empty()).then_some(text))
}

fn null_as_empty<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(de)?.unwrap_or_default())
}

impl Scenario {
    /// Human-readable block: title, preconditions, numbered steps, expected result.
    pub fn to_description(&self) -> String {
        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n");

        let parts = [
            Some(self.title.clone()),
            self.preconditions.as_ref().map(|p| format!("Preconditions: {p}")),
            (!steps.is_empty()).then(|| format!("Steps:\n{steps}")),
            self.expected_results.as_ref().map(|e| format!("Expected: {e}")),
        ];
        parts
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Repository path of a test's spec file, named the way the backend names it.
pub fn spec_path(test_name: &str) -> String {
    format!("tests/{}.spec.ts", sanitize_name(test_name))
}

/// Replaces each run of characters outside `[A-Za-z0-9._-]` with one `_`.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: serde_json::Value) -> Scenario {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn steps_accept_string_list_or_nothing() {
        let one = parse(json!({"id": "S1", "title": "Login", "steps": "open the page"}));
        assert_eq!(one.steps, vec!["open the page"]);

        let many = parse(json!({"id": "S2", "steps": ["a", "b"]}));
        assert_eq!(many.steps, vec!["a", "b"]);
        assert_eq!(many.title, "");

        assert!(parse(json!({"id": "S3"})).steps.is_empty());
        assert!(parse(json!({"id": "S4", "steps": null})).steps.is_empty());
        assert!(parse(json!({"id": "S5", "steps": "  "})).steps.is_empty());
    }

    #[test]
    fn text_fields_accept_lists_and_nulls() {
        let sc = parse(json!({
            "id": "S1",
            "title": null,
            "preconditions": ["logged in", "cart has one item"],
            "expected_results": ["shows cart", "total updates"]
        }));
        assert_eq!(sc.title, "");
        assert_eq!(sc.preconditions.as_deref(), Some("logged in; cart has one item"));
        assert_eq!(sc.expected_results.as_deref(), Some("shows cart; total updates"));

        let empty = parse(json!({"id": "S2", "preconditions": [], "expected_results": null}));
        assert!(empty.preconditions.is_none());
        assert!(empty.expected_results.is_none());
    }

    #[test]
    fn serialises_steps_as_list() {
        let sc = parse(json!({"id": "S1", "title": "t", "steps": "only"}));
        let v = serde_json::to_value(&sc).unwrap();
        assert_eq!(v["steps"], json!(["only"]));
        assert!(v.get("priority").is_none());
    }

    #[test]
    fn description_skips_missing_parts() {
        let sc = parse(json!({
            "id": "S1",
            "title": "Checkout",
            "steps": ["add item", "pay"],
            "expected_results": "order placed"
        }));
        assert_eq!(
            sc.to_description(),
            "Checkout\n\nSteps:\n1. add item\n2. pay\n\nExpected: order placed"
        );

        let bare = parse(json!({"id": "S2", "preconditions": "logged in"}));
        assert_eq!(bare.to_description(), "Preconditions: logged in");
    }

    #[test]
    fn sanitize_collapses_runs() {
        assert_eq!(sanitize_name("login flow / happy path"), "login_flow_happy_path");
        assert_eq!(sanitize_name("ok-name_1.2"), "ok-name_1.2");
        assert_eq!(sanitize_name("ünï"), "_n_");
    }

    #[test]
    fn spec_path_uses_sanitised_name() {
        assert_eq!(spec_path("login flow"), "tests/login_flow.spec.ts");
    }
}
