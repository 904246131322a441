//! The hello handler.

use tracing::debug;

use crate::resolver::{ConfigResolver, GreetingTemplate};

/// Extract a usable name from a request body.
///
/// Returns `None` for empty bodies, anything that is not a JSON object, a
/// missing or non-string `name`, and blank names. A usable name is returned
/// exactly as sent.
pub fn parse_name(body: &[u8]) -> Option<String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "unparsable greeting body, using default name");
            return None;
        }
    };
    usable_name(value.as_object()?.get("name")?.as_str()?)
}

fn usable_name(raw: &str) -> Option<String> {
    (!raw.trim().is_empty()).then(|| raw.to_string())
}

/// Stateless greeting handler. Cheap to clone; one lives in each warm slot.
#[derive(Clone)]
pub struct Greeter {
    resolver: ConfigResolver,
    default_name: String,
}

impl Greeter {
    pub fn new(resolver: ConfigResolver, default_name: impl Into<String>) -> Self {
        Self {
            resolver,
            default_name: default_name.into(),
        }
    }

    /// Render the greeting for a request against an already-resolved template.
    ///
    /// A name in the body wins over `query_name`.
    pub fn handle_with(
        &self,
        template: &GreetingTemplate,
        body: &[u8],
        query_name: Option<&str>,
    ) -> String {
        let name = parse_name(body)
            .or_else(|| query_name.and_then(usable_name))
            .unwrap_or_else(|| self.default_name.clone());
        template.render(&name)
    }

    /// Resolve the current template and render the greeting.
    pub fn handle(&self, body: &[u8], query_name: Option<&str>) -> String {
        let template = self.resolver.resolve();
        self.handle_with(&template, body, query_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use guild_state::StateStore;

    use crate::resolver::TemplateSource;

    const KEY: &str = "/guild/hello-service/message";

    fn greeter(store: StateStore) -> Greeter {
        Greeter::new(
            ConfigResolver::new(Arc::new(store), KEY, "Hello, {name}!"),
            "world",
        )
    }

    fn empty_greeter() -> Greeter {
        greeter(StateStore::open_in_memory().unwrap())
    }

    #[test]
    fn greets_named_caller() {
        assert_eq!(empty_greeter().handle(br#"{"name": "Ada"}"#, None), "Hello, Ada!");
    }

    #[test]
    fn empty_object_greets_world() {
        assert_eq!(empty_greeter().handle(b"{}", None), "Hello, world!");
    }

    #[test]
    fn absent_body_greets_world() {
        assert_eq!(empty_greeter().handle(b"", None), "Hello, world!");
        assert_eq!(empty_greeter().handle(b"  \n", None), "Hello, world!");
    }

    #[test]
    fn malformed_names_greet_world() {
        let greeter = empty_greeter();
        let bodies: [&[u8]; 8] = [
            b"not json",
            br#"{"name": 42}"#,
            br#"{"name": null}"#,
            br#"{"name": ["Ada"]}"#,
            br#"{"name": "   "}"#,
            br#"{"nam": "Ada"}"#,
            br#"["Ada"]"#,
            br#"{"name": "Ada""#,
        ];
        for body in bodies {
            assert_eq!(greeter.handle(body, None), "Hello, world!", "body: {body:?}");
        }
    }

    #[test]
    fn names_are_rendered_verbatim() {
        let greeter = empty_greeter();
        assert_eq!(greeter.handle(br#"{"name": " Ada "}"#, None), "Hello,  Ada !");
        assert_eq!(greeter.handle(b"", Some(" Linus")), "Hello,  Linus!");
        assert_eq!(
            greeter.handle(r#"{"name": "Zoë O'Brien"}"#.as_bytes(), None),
            "Hello, Zoë O'Brien!"
        );
    }

    #[test]
    fn extra_fields_are_ignored() {
        assert_eq!(
            empty_greeter().handle(br#"{"name": "Ada", "lang": "en"}"#, None),
            "Hello, Ada!"
        );
    }

    #[test]
    fn query_name_used_when_body_has_none() {
        let greeter = empty_greeter();
        assert_eq!(greeter.handle(b"", Some("Linus")), "Hello, Linus!");
        assert_eq!(greeter.handle(b"", Some("")), "Hello, world!");
        assert_eq!(
            greeter.handle(br#"{"name": "Ada"}"#, Some("Linus")),
            "Hello, Ada!"
        );
    }

    #[test]
    fn stored_template_is_used() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_parameter(KEY, "Hi there, {name}!").unwrap();
        assert_eq!(greeter(store).handle(br#"{"name": "Ada"}"#, None), "Hi there, Ada!");
    }

    #[test]
    fn handle_with_uses_given_template() {
        let template = GreetingTemplate::new("Welcome back, {name}.", TemplateSource::Store);
        assert_eq!(
            empty_greeter().handle_with(&template, br#"{"name": "Ada"}"#, None),
            "Welcome back, Ada."
        );
    }
}
