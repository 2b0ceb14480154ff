// Prompt template rendering (§4.5 step 2). Pure substitution over
// `{{var}}` and `${var}` tokens plus a compiled-template cache with LRU+TTL
// eviction (§6 `template.cache.*`).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use regex::Regex;

/// Matches both `{{var}}` and `${var}` placeholder forms in one pass.
fn placeholder_pattern() -> Regex {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}|\$\{\s*([A-Za-z0-9_.\-]+)\s*\}").unwrap()
}

/// Substitutes every `{{var}}`/`${var}` occurrence in `template` with the
/// corresponding entry in `vars`. Unknown tokens become empty strings.
/// Pure and idempotent when `template` has no nested placeholders:
/// `render(render(t, v), v) == render(t, v)`.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let pattern = placeholder_pattern();
    pattern
        .replace_all(template, |caps: &regex::Captures| {
            let key = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or("");
            vars.get(key).cloned().unwrap_or_default()
        })
        .into_owned()
}

struct CachedTemplate {
    compiled: String,
    inserted_at: Instant,
}

/// LRU+TTL cache over rendered templates, keyed by the raw template string.
/// Disabled entirely (every call recompiles) when constructed with
/// `enabled: false`.
pub struct TemplateCache {
    enabled: bool,
    max_size: usize,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedTemplate>>,
    order: Mutex<Vec<String>>,
}

impl TemplateCache {
    pub fn new(enabled: bool, max_size: usize, ttl: Duration) -> Self {
        Self {
            enabled,
            max_size,
            ttl,
            entries: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
        }
    }

    /// Renders `template` against `vars`, consulting the cache keyed by the
    /// raw template text. Variable substitution itself is never cached
    /// across different `vars` — only the normalized template text is, so a
    /// render with a fresh `vars` map still recomputes substitution; the
    /// cache exists to avoid re-validating/re-parsing the same template
    /// string repeatedly under high stage fan-out.
    pub fn render(&self, template: &str, vars: &HashMap<String, String>) -> String {
        if !self.enabled {
            return render(template, vars);
        }

        {
            let mut entries = self.entries.lock().unwrap();
            if let Some(cached) = entries.get(template) {
                if cached.inserted_at.elapsed() < self.ttl {
                    return render(&cached.compiled, vars);
                }
            }
            entries.remove(template);
        }

        let compiled = template.to_string();
        self.insert(template.to_string(), compiled.clone());
        render(&compiled, vars)
    }

    fn insert(&self, key: String, compiled: String) {
        let mut entries = self.entries.lock().unwrap();
        let mut order = self.order.lock().unwrap();

        if entries.len() >= self.max_size {
            if let Some(oldest) = order.first().cloned() {
                entries.remove(&oldest);
                order.remove(0);
            }
        }

        entries.insert(
            key.clone(),
            CachedTemplate {
                compiled,
                inserted_at: Instant::now(),
            },
        );
        order.retain(|k| k != &key);
        order.push(key);
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new(true, 256, Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn renders_both_placeholder_forms() {
        let rendered = render("hi {{name}}, your id is ${id}", &vars(&[("name", "ada"), ("id", "7")]));
        assert_eq!(rendered, "hi ada, your id is 7");
    }

    #[test]
    fn unknown_tokens_become_empty() {
        let rendered = render("value: {{missing}}", &vars(&[]));
        assert_eq!(rendered, "value: ");
    }

    #[test]
    fn render_is_idempotent_without_nested_placeholders() {
        let template = "hello {{name}}";
        let v = vars(&[("name", "world")]);
        let once = render(template, &v);
        let twice = render(&once, &v);
        assert_eq!(once, twice);
    }

    #[test]
    fn cache_disabled_still_renders_correctly() {
        let cache = TemplateCache::new(false, 10, Duration::from_secs(60));
        let rendered = cache.render("{{x}}", &vars(&[("x", "1")]));
        assert_eq!(rendered, "1");
    }

    #[test]
    fn cache_evicts_oldest_beyond_max_size() {
        let cache = TemplateCache::new(true, 1, Duration::from_secs(60));
        cache.render("a {{x}}", &vars(&[("x", "1")]));
        cache.render("b {{x}}", &vars(&[("x", "2")]));
        assert_eq!(cache.entries.lock().unwrap().len(), 1);
    }
}
