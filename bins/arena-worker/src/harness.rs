/// Harness generation
///
/// A harness is the submitted source followed by a small driver that:
/// 1. Reads the JSON argument list from stdin
/// 2. Resolves the challenge's entry point, first as a top-level function,
///    then as a method on a `Solution` instance
/// 3. Calls it positionally and writes the return value as one JSON line
///
/// The driver prints a leading newline so that stray output without a
/// trailing newline cannot merge into the result line. The runner reads the
/// last non-empty line of stdout.

use anyhow::{bail, Context, Result};
use arena_common::types::Language;
use handlebars::Handlebars;
use serde_json::json;

const PYTHON_TEMPLATE: &str = r#"{{{source}}}


def __arena_main():
    import json
    import sys

    name = "{{entry_point}}"
    target = globals().get(name)
    if not callable(target):
        solution = globals().get("Solution")
        if solution is None or not callable(getattr(solution, name, None)):
            raise NameError("entry point '" + name + "' is not defined")
        target = getattr(solution(), name)
    args = json.loads(sys.stdin.read())
    result = target(*args)
    sys.stdout.write("\n" + json.dumps(result) + "\n")
    sys.stdout.flush()


if __name__ == "__main__":
    __arena_main()
"#;

const JAVASCRIPT_TEMPLATE: &str = r#"{{{source}}}

;(() => {
  let target;
  if (typeof {{entry_point}} === "function") {
    target = {{entry_point}};
  } else if (typeof Solution === "function" && typeof Solution.prototype.{{entry_point}} === "function") {
    const instance = new Solution();
    target = instance.{{entry_point}}.bind(instance);
  } else {
    throw new ReferenceError("entry point '{{entry_point}}' is not defined");
  }
  const args = JSON.parse(require("fs").readFileSync(0, "utf8"));
  const result = target(...args);
  process.stdout.write("\n" + JSON.stringify(result === undefined ? null : result) + "\n");
})();
"#;

/// Entry points are spliced into driver code, so only plain identifiers are allowed
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

pub struct HarnessBuilder {
    registry: Handlebars<'static>,
}

impl HarnessBuilder {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        // Source code is not HTML
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(Language::Python.as_str(), PYTHON_TEMPLATE)
            .context("Failed to register python harness template")?;
        registry
            .register_template_string(Language::Javascript.as_str(), JAVASCRIPT_TEMPLATE)
            .context("Failed to register javascript harness template")?;
        Ok(Self { registry })
    }

    pub fn render(&self, language: Language, source_code: &str, entry_point: &str) -> Result<String> {
        if !is_identifier(entry_point) {
            bail!("Entry point '{}' is not a valid identifier", entry_point);
        }
        // `$` is legal in JavaScript names only
        if language == Language::Python && entry_point.contains('$') {
            bail!("Entry point '{}' is not a valid Python identifier", entry_point);
        }

        self.registry
            .render(
                language.as_str(),
                &json!({ "source": source_code, "entry_point": entry_point }),
            )
            .with_context(|| format!("Failed to render {} harness", language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("two_sum"));
        assert!(is_identifier("twoSum"));
        assert!(is_identifier("_private"));
        assert!(is_identifier("$helper"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier("f(); import os"));
    }

    #[test]
    fn test_python_harness_embeds_source_verbatim() {
        let builder = HarnessBuilder::new().unwrap();
        let source = "def two_sum(nums, target):\n    return [i for i in range(2)] if '<&>' else None\n";
        let harness = builder.render(Language::Python, source, "two_sum").unwrap();

        assert!(harness.starts_with(source));
        assert!(harness.contains("name = \"two_sum\""));
        assert!(harness.contains("json.loads(sys.stdin.read())"));
        assert!(!harness.contains("&lt;"));
    }

    #[test]
    fn test_javascript_harness_calls_entry_point() {
        let builder = HarnessBuilder::new().unwrap();
        let source = "function isValid(s) { return s.length % 2 === 0 && \"<>\" !== s; }";
        let harness = builder.render(Language::Javascript, source, "isValid").unwrap();

        assert!(harness.starts_with(source));
        assert!(harness.contains("typeof isValid === \"function\""));
        assert!(harness.contains("Solution.prototype.isValid"));
        assert!(harness.contains("readFileSync(0"));
    }

    #[test]
    fn test_rejects_injected_entry_point() {
        let builder = HarnessBuilder::new().unwrap();
        assert!(builder
            .render(Language::Javascript, "", "x; process.exit(0)")
            .is_err());
        assert!(builder.render(Language::Python, "", "$x").is_err());
    }
}
