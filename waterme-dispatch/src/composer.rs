use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing;
use waterme_core::{ActionType, CareItem, TemplateLoadError};

const ITEM_NAME: &str = "{itemName}";
const COUNT: &str = "{count}";
const NAMES: &str = "{names}";
const REMAINING: &str = "{remaining}";

/// Up to this many items every name is listed.
const MAX_LISTED_NAMES: usize = 3;
/// Past that, only the first few are named and `{remaining}` covers the rest.
const NAMES_WHEN_TRUNCATED: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageTemplate {
    pub title: String,
    pub body: String,
}

impl MessageTemplate {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    fn mentions(&self, placeholder: &str) -> bool {
        self.title.contains(placeholder) || self.body.contains(placeholder)
    }
}

/// Template variants for one action type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TemplatePool {
    #[serde(default, alias = "singular")]
    pub single: Vec<MessageTemplate>,
    #[serde(default, alias = "plural")]
    pub multiple: Vec<MessageTemplate>,
}

/// Immutable set of template pools, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    pools: HashMap<ActionType, TemplatePool>,
}

impl TemplateRegistry {
    /// Reads `<dir>/<action>.json` for every action type. A missing or
    /// malformed file fails the whole load.
    pub fn load(dir: &Path) -> Result<Self, TemplateLoadError> {
        let mut pools = HashMap::new();

        for action in ActionType::ALL {
            let path = dir.join(format!("{}.json", action.as_str()));
            let raw = fs::read_to_string(&path).map_err(|source| TemplateLoadError::Read {
                path: path.clone(),
                source,
            })?;
            let pool: TemplatePool = serde_json::from_str(&raw)
                .map_err(|source| TemplateLoadError::Parse { path, source })?;

            tracing::info!(
                "Loaded {} single and {} multiple messages for {}",
                pool.single.len(),
                pool.multiple.len(),
                action
            );
            pools.insert(action, pool);
        }

        Ok(Self { pools })
    }

    pub fn from_pools(pools: impl IntoIterator<Item = (ActionType, TemplatePool)>) -> Self {
        Self {
            pools: pools.into_iter().collect(),
        }
    }

    pub fn pool(&self, action: ActionType) -> Option<&TemplatePool> {
        self.pools.get(&action)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub title: String,
    pub body: String,
}

/// Picks and renders reminder texts. The random source is owned by the
/// composer so tests can pass a seeded one.
pub struct MessageComposer<R = StdRng> {
    registry: TemplateRegistry,
    rng: Mutex<R>,
}

impl MessageComposer<StdRng> {
    pub fn new(registry: TemplateRegistry) -> Self {
        Self::with_rng(registry, StdRng::from_entropy())
    }
}

impl<R: RngCore> MessageComposer<R> {
    pub fn with_rng(registry: TemplateRegistry, rng: R) -> Self {
        Self {
            registry,
            rng: Mutex::new(rng),
        }
    }

    pub fn compose(&self, action: ActionType, items: &[CareItem]) -> RenderedMessage {
        let pool = self.registry.pool(action);

        match items {
            [] => fallback_message(action, items),
            [item] => {
                let template = pool.and_then(|p| self.pick(p.single.iter()));
                match template {
                    Some(t) => render_single(t, item),
                    None => fallback_message(action, items),
                }
            }
            _ => {
                let template = pool.and_then(|p| {
                    // Up to three items every name is listed and nothing "remains";
                    // past that, templates without `{remaining}` would hide the rest.
                    let truncated = items.len() > MAX_LISTED_NAMES;
                    self.pick(p.multiple.iter().filter(|t| t.mentions(REMAINING) == truncated))
                        .or_else(|| self.pick(p.multiple.iter()))
                });
                match template {
                    Some(t) => render_multiple(t, items),
                    None => fallback_message(action, items),
                }
            }
        }
    }

    fn pick<'a>(&self, candidates: impl Iterator<Item = &'a MessageTemplate>) -> Option<&'a MessageTemplate> {
        let candidates: Vec<&MessageTemplate> = candidates.collect();
        candidates.choose(&mut *self.rng.lock()).copied()
    }
}

fn render_single(template: &MessageTemplate, item: &CareItem) -> RenderedMessage {
    RenderedMessage {
        title: template.title.replace(ITEM_NAME, &item.name),
        body: template.body.replace(ITEM_NAME, &item.name),
    }
}

fn render_multiple(template: &MessageTemplate, items: &[CareItem]) -> RenderedMessage {
    let count = items.len().to_string();
    let names = format_names(items);
    let remaining = remaining_count(items).to_string();

    let render = |text: &str| {
        text.replace(COUNT, &count)
            .replace(NAMES, &names)
            .replace(REMAINING, &remaining)
    };

    RenderedMessage {
        title: render(&template.title),
        body: render(&template.body),
    }
}

/// All names for up to three items, otherwise the first two.
pub fn format_names(items: &[CareItem]) -> String {
    let shown = if items.len() <= MAX_LISTED_NAMES {
        items.len()
    } else {
        NAMES_WHEN_TRUNCATED
    };
    items[..shown]
        .iter()
        .map(|item| item.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Items left unnamed by [`format_names`].
pub fn remaining_count(items: &[CareItem]) -> usize {
    if items.len() <= MAX_LISTED_NAMES {
        0
    } else {
        items.len() - NAMES_WHEN_TRUNCATED
    }
}

fn display_name(item: Option<&CareItem>) -> &str {
    match item {
        Some(item) if !item.name.trim().is_empty() => &item.name,
        _ => "Your plant",
    }
}

/// Built-in texts for when no template is available. Never empty.
pub fn fallback_message(action: ActionType, items: &[CareItem]) -> RenderedMessage {
    let count = items.len();
    let name = display_name(items.first());

    let (title, body) = match (action, count <= 1) {
        (ActionType::Watering, true) => (
            "Time to water your plant! 💧".to_string(),
            format!("{} needs water", name),
        ),
        (ActionType::Watering, false) => (
            format!("{} plants need water! 💧", count),
            if items.iter().any(|item| !item.name.trim().is_empty()) {
                format_names(items)
            } else {
                "Your plants are thirsty".to_string()
            },
        ),
        (ActionType::Fertilizing, true) => (
            "Time to fertilize! 🌱".to_string(),
            format!("{} needs fertilizer", name),
        ),
        (ActionType::Fertilizing, false) => (
            format!("{} plants need fertilizer! 🌱", count),
            "Don't forget to feed your plants".to_string(),
        ),
        (ActionType::Misting, true) => (
            "Misting time! 💦".to_string(),
            format!("{} needs misting", name),
        ),
        (ActionType::Misting, false) => (
            format!("{} plants need misting! 💦", count),
            "Keep your plants humid and happy".to_string(),
        ),
        (ActionType::Repotting, true) => (
            "Repotting reminder! 🪴".to_string(),
            format!("{} might need repotting", name),
        ),
        (ActionType::Repotting, false) => (
            format!("{} plants might need repotting! 🪴", count),
            "Check if your plants need fresh soil".to_string(),
        ),
    };

    RenderedMessage { title, body }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn items(names: &[&str]) -> Vec<CareItem> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| CareItem::new(format!("p{i}"), "u1", *name))
            .collect()
    }

    fn composer(pool: TemplatePool) -> MessageComposer {
        let registry = TemplateRegistry::from_pools([(ActionType::Watering, pool)]);
        MessageComposer::with_rng(registry, StdRng::seed_from_u64(42))
    }

    #[test]
    fn single_item_fills_item_name_everywhere() {
        let composer = composer(TemplatePool {
            single: vec![MessageTemplate::new("{itemName} is thirsty", "Give {itemName} a drink")],
            multiple: vec![],
        });

        let message = composer.compose(ActionType::Watering, &items(&["Fern"]));
        assert_eq!(message.title, "Fern is thirsty");
        assert_eq!(message.body, "Give Fern a drink");
    }

    #[test]
    fn three_items_list_every_name() {
        let composer = composer(TemplatePool {
            single: vec![],
            multiple: vec![
                MessageTemplate::new("{count} plants need water", "{names} and {remaining} more"),
                MessageTemplate::new("{count} plants need water", "Water {names}"),
            ],
        });

        for _ in 0..20 {
            let message = composer.compose(ActionType::Watering, &items(&["Fern", "Monstera", "Pothos"]));
            assert_eq!(message.title, "3 plants need water");
            assert_eq!(message.body, "Water Fern, Monstera, Pothos");
        }
    }

    #[test]
    fn four_items_name_two_and_count_the_rest() {
        let composer = composer(TemplatePool {
            single: vec![],
            multiple: vec![MessageTemplate::new("{count} plants need water", "{names} and {remaining} more")],
        });

        let message = composer.compose(ActionType::Watering, &items(&["Fern", "Monstera", "Pothos", "Ivy"]));
        assert_eq!(message.title, "4 plants need water");
        assert_eq!(message.body, "Fern, Monstera and 2 more");
    }

    #[test]
    fn long_lists_prefer_templates_that_count_the_rest() {
        let composer = composer(TemplatePool {
            single: vec![],
            multiple: vec![
                MessageTemplate::new("{count} plants need water", "Water {names}"),
                MessageTemplate::new("{count} plants need water", "{names} and {remaining} more"),
            ],
        });

        for _ in 0..20 {
            let message = composer.compose(ActionType::Watering, &items(&["Fern", "Monstera", "Pothos", "Ivy"]));
            assert_eq!(message.body, "Fern, Monstera and 2 more");
        }
    }

    #[test]
    fn long_lists_use_any_template_when_none_counts_the_rest() {
        let composer = composer(TemplatePool {
            single: vec![],
            multiple: vec![MessageTemplate::new("{count} plants need water", "Water {names}")],
        });

        let message = composer.compose(ActionType::Watering, &items(&["Fern", "Monstera", "Pothos", "Ivy"]));
        assert_eq!(message.body, "Water Fern, Monstera");
    }

    #[test]
    fn watering_fallback_names_the_plants() {
        let message = fallback_message(ActionType::Watering, &items(&["Fern", "Ivy"]));
        assert_eq!(message.title, "2 plants need water! 💧");
        assert_eq!(message.body, "Fern, Ivy");

        let message = fallback_message(ActionType::Watering, &items(&["", " "]));
        assert_eq!(message.body, "Your plants are thirsty");
    }

    #[test]
    fn same_seed_same_choice() {
        let pool = TemplatePool {
            single: (0..10)
                .map(|i| MessageTemplate::new(format!("variant {i}"), "{itemName}"))
                .collect(),
            multiple: vec![],
        };
        let a = composer(pool.clone());
        let b = composer(pool);
        for _ in 0..5 {
            assert_eq!(
                a.compose(ActionType::Watering, &items(&["Fern"])),
                b.compose(ActionType::Watering, &items(&["Fern"]))
            );
        }
    }

    #[test]
    fn empty_or_missing_pools_fall_back() {
        let composer = composer(TemplatePool::default());

        for action in ActionType::ALL {
            for case in [items(&[""]), items(&["Fern", "Ivy"])] {
                let message = composer.compose(action, &case);
                assert!(!message.title.is_empty(), "{action}");
                assert!(!message.body.is_empty(), "{action}");
            }
        }

        let message = composer.compose(ActionType::Misting, &items(&[""]));
        assert_eq!(message.body, "Your plant needs misting");
    }

    #[test]
    fn loads_every_action_file() {
        let dir = tempfile::tempdir().unwrap();
        for action in ActionType::ALL {
            let mut file = fs::File::create(dir.path().join(format!("{}.json", action))).unwrap();
            write!(
                file,
                r#"{{"single": [{{"title": "t", "body": "b"}}], "plural": []}}"#
            )
            .unwrap();
        }

        let registry = TemplateRegistry::load(dir.path()).unwrap();
        let pool = registry.pool(ActionType::Repotting).unwrap();
        assert_eq!(pool.single.len(), 1);
        assert!(pool.multiple.is_empty());
    }

    #[test]
    fn shipped_messages_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../messages");
        let registry = TemplateRegistry::load(&dir).unwrap();
        for action in ActionType::ALL {
            let pool = registry.pool(action).unwrap();
            assert!(!pool.single.is_empty() && !pool.multiple.is_empty(), "{action}");
        }
    }

    #[test]
    fn missing_or_malformed_file_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let err = TemplateRegistry::load(dir.path()).unwrap_err();
        assert!(matches!(err, TemplateLoadError::Read { .. }));

        for action in ActionType::ALL {
            fs::write(dir.path().join(format!("{}.json", action)), "{}").unwrap();
        }
        fs::write(dir.path().join("misting.json"), "{ not json").unwrap();
        let err = TemplateRegistry::load(dir.path()).unwrap_err();
        assert!(matches!(err, TemplateLoadError::Parse { .. }));
    }
}
