use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;

use crate::action::{Action, HttpAction};
use crate::error::{Error, Result, ScenarioError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// Executor kind plus the kind-specific fields of one scenario, as declared.
///
/// Validation against the executor kind happens when the executor is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioOptions {
    /// Executor kind. If missing, defaults to constant VUs.
    pub executor: Option<String>,

    pub vus: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<Duration>,
    pub max_duration: Option<Duration>,

    // Ramping VUs
    pub start_vus: Option<u64>,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioDefinition {
    pub name: String,
    pub options: ScenarioOptions,
    pub action: Action,
}

/// Scenarios in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestDefinition {
    pub scenarios: Vec<ScenarioDefinition>,
}

/// Where a test definition comes from.
pub trait DefinitionSource {
    /// Human-readable reference (path or label), attached to logs and executors.
    fn label(&self) -> String;

    /// `Ok(None)` means the source resolved but declares no scenarios.
    fn load(&self) -> Result<Option<TestDefinition>>;
}

impl DefinitionSource for TestDefinition {
    fn label(&self) -> String {
        "<inline>".to_string()
    }

    fn load(&self) -> Result<Option<TestDefinition>> {
        if self.scenarios.is_empty() {
            return Ok(None);
        }
        check_unique_names(&self.scenarios)?;
        Ok(Some(self.clone()))
    }
}

/// YAML definition read from disk.
#[derive(Debug, Clone)]
pub struct YamlFile {
    path: PathBuf,
}

impl YamlFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DefinitionSource for YamlFile {
    fn label(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<Option<TestDefinition>> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| Error::ReadDefinition {
            path: self.label(),
            source,
        })?;
        parse_yaml(&text)
    }
}

/// YAML definition held in memory.
#[derive(Debug, Clone)]
pub struct YamlStr<'a> {
    label: &'a str,
    text: &'a str,
}

impl<'a> YamlStr<'a> {
    pub fn new(label: &'a str, text: &'a str) -> Self {
        Self { label, text }
    }
}

impl DefinitionSource for YamlStr<'_> {
    fn label(&self) -> String {
        self.label.to_string()
    }

    fn load(&self) -> Result<Option<TestDefinition>> {
        parse_yaml(self.text)
    }
}

fn parse_yaml(text: &str) -> Result<Option<TestDefinition>> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let doc: DocumentYaml =
        serde_yaml::from_str(text).map_err(|err| Error::Definition(err.to_string()))?;

    let Some(scenarios) = doc.options.and_then(|o| o.scenarios) else {
        return Ok(None);
    };
    if scenarios.is_empty() {
        return Ok(None);
    }

    let default_action = doc
        .default
        .map(|a| a.into_action("default"))
        .transpose()?
        .unwrap_or(Action::Noop);

    let mut named: BTreeMap<String, Action> = BTreeMap::new();
    for (name, action) in doc.exec {
        let action = action.into_action(&name)?;
        named.insert(name, action);
    }

    let mut out = Vec::with_capacity(scenarios.len());
    for (key, value) in scenarios {
        let Some(name) = key.as_str().map(str::to_string) else {
            return Err(Error::Definition(format!(
                "scenario names must be strings (got {key:?})"
            )));
        };

        let s: ScenarioYaml = serde_yaml::from_value(value)
            .map_err(|err| Error::Definition(format!("scenario `{name}`: {err}")))?;

        let action = match &s.exec {
            Some(exec) => named
                .get(exec)
                .cloned()
                .ok_or_else(|| Error::scenario(&name, ScenarioError::UnknownExec(exec.clone())))?,
            None => default_action.clone(),
        };

        out.push(ScenarioDefinition {
            name,
            options: s.into_options(),
            action,
        });
    }

    check_unique_names(&out)?;
    Ok(Some(TestDefinition { scenarios: out }))
}

fn check_unique_names(scenarios: &[ScenarioDefinition]) -> Result<()> {
    let mut seen = HashSet::with_capacity(scenarios.len());
    for s in scenarios {
        if !seen.insert(s.name.as_str()) {
            return Err(Error::DuplicateScenario(s.name.clone()));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DocumentYaml {
    /// Action for scenarios without `exec`.
    #[serde(default)]
    default: Option<ActionYaml>,

    /// Named actions, referenced by `exec`.
    #[serde(default)]
    exec: BTreeMap<String, ActionYaml>,

    #[serde(default)]
    options: Option<OptionsYaml>,
}

#[derive(Debug, Deserialize)]
struct OptionsYaml {
    // A raw mapping keeps declaration order.
    #[serde(default)]
    scenarios: Option<serde_yaml::Mapping>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ScenarioYaml {
    executor: Option<String>,
    exec: Option<String>,
    vus: Option<u64>,
    iterations: Option<u64>,
    duration: Option<YamlDuration>,
    max_duration: Option<YamlDuration>,
    #[serde(rename = "startVUs")]
    start_vus: Option<u64>,
    #[serde(default)]
    stages: Vec<StageYaml>,
}

impl ScenarioYaml {
    fn into_options(self) -> ScenarioOptions {
        ScenarioOptions {
            executor: self.executor,
            vus: self.vus,
            iterations: self.iterations,
            duration: self.duration.map(YamlDuration::into_inner),
            max_duration: self.max_duration.map(YamlDuration::into_inner),
            start_vus: self.start_vus,
            stages: self
                .stages
                .into_iter()
                .map(|s| Stage {
                    duration: s.duration.into_inner(),
                    target: s.target,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StageYaml {
    target: u64,
    #[serde(default)]
    duration: YamlDuration,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActionYaml {
    sleep: Option<YamlDuration>,
    http: Option<HttpActionYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HttpActionYaml {
    url: String,
    method: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    body: Option<String>,
    timeout: Option<YamlDuration>,
}

impl ActionYaml {
    fn into_action(self, name: &str) -> Result<Action> {
        match (self.sleep, self.http) {
            (Some(d), None) => Ok(Action::Sleep(d.into_inner())),
            (None, Some(http)) => http.into_action(name),
            _ => Err(Error::Definition(format!(
                "action `{name}` must define exactly one of `sleep` or `http`"
            ))),
        }
    }
}

impl HttpActionYaml {
    fn into_action(self, name: &str) -> Result<Action> {
        let method = match self.method.as_deref() {
            None => http::Method::GET,
            Some(m) => http::Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(
                |_| Error::Definition(format!("action `{name}`: invalid http method `{m}`")),
            )?,
        };

        let parsed = url::Url::parse(&self.url).map_err(|err| {
            Error::Definition(format!("action `{name}`: invalid url `{}`: {err}", self.url))
        })?;
        if parsed.scheme() != "http" {
            return Err(Error::Definition(format!(
                "action `{name}`: only http:// URLs are supported (got `{}`)",
                self.url
            )));
        }

        Ok(Action::Http(HttpAction {
            method,
            url: self.url,
            headers: self.headers.into_iter().collect(),
            body: self.body.map(Bytes::from).unwrap_or_default(),
            timeout: self.timeout.map(YamlDuration::into_inner),
        }))
    }
}

/// Duration as a humantime string (`2s`, `250ms`) or a number of seconds.
#[derive(Debug, Clone, Copy, Default)]
struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                humantime::parse_duration(v)
                    .map(YamlDuration)
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(V)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(text: &str) -> Result<Option<TestDefinition>> {
        YamlStr::new("test.yaml", text).load()
    }

    fn must_load(text: &str) -> TestDefinition {
        match load(text) {
            Ok(Some(def)) => def,
            Ok(None) => panic!("expected scenarios"),
            Err(err) => panic!("failed to load definition: {err}"),
        }
    }

    #[test]
    fn scenarios_keep_declaration_order() {
        let def = must_load(
            r#"
options:
  scenarios:
    zeta: { executor: constant-vus, vus: 2, duration: 2s }
    alpha: { executor: shared-iterations, iterations: 10 }
    mid:
      executor: ramping-vus
      startVUs: 1
      stages:
        - { duration: 1s, target: 5 }
        - { duration: 500ms, target: 0 }
"#,
        );

        let names: Vec<&str> = def.scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);

        let zeta = &def.scenarios[0].options;
        assert_eq!(zeta.executor.as_deref(), Some("constant-vus"));
        assert_eq!(zeta.vus, Some(2));
        assert_eq!(zeta.duration, Some(Duration::from_secs(2)));

        let mid = &def.scenarios[2].options;
        assert_eq!(mid.start_vus, Some(1));
        assert_eq!(
            mid.stages,
            vec![
                Stage {
                    duration: Duration::from_secs(1),
                    target: 5
                },
                Stage {
                    duration: Duration::from_millis(500),
                    target: 0
                },
            ]
        );
    }

    #[test]
    fn missing_options_or_scenarios_resolve_to_nothing() {
        assert!(matches!(load(""), Ok(None)));
        assert!(matches!(load("default: { sleep: 1ms }"), Ok(None)));
        assert!(matches!(load("options: { vus: 2 }"), Err(_) | Ok(None)));
        assert!(matches!(load("options: {}"), Ok(None)));
        assert!(matches!(load("options: { scenarios: {} }"), Ok(None)));
    }

    #[test]
    fn exec_resolves_named_actions_and_default() {
        let def = must_load(
            r#"
default: { sleep: 10ms }
exec:
  hit:
    http: { url: "http://127.0.0.1:1/x", method: post, body: ping }
options:
  scenarios:
    a: { vus: 1 }
    b: { vus: 1, exec: hit }
"#,
        );

        assert_eq!(
            def.scenarios[0].action,
            Action::Sleep(Duration::from_millis(10))
        );
        match &def.scenarios[1].action {
            Action::Http(h) => {
                assert_eq!(h.method, http::Method::POST);
                assert_eq!(h.body, Bytes::from_static(b"ping"));
            }
            other => panic!("expected http action, got {other:?}"),
        }
    }

    #[test]
    fn scenario_without_default_is_noop() {
        let def = must_load("options: { scenarios: { a: { vus: 1 } } }");
        assert_eq!(def.scenarios[0].action, Action::Noop);
    }

    #[test]
    fn unknown_exec_is_rejected() {
        let err = load("options: { scenarios: { a: { exec: nope } } }");
        match err {
            Err(Error::Scenario {
                scenario,
                source: ScenarioError::UnknownExec(exec),
            }) => {
                assert_eq!(scenario, "a");
                assert_eq!(exec, "nope");
            }
            other => panic!("expected unknown exec, got {other:?}"),
        }
    }

    #[test]
    fn invalid_actions_are_rejected() {
        assert!(matches!(
            load("default: {}\noptions: { scenarios: { a: {} } }"),
            Err(Error::Definition(_))
        ));
        assert!(matches!(
            load("default: { http: { url: \"https://example.com\" } }\noptions: { scenarios: { a: {} } }"),
            Err(Error::Definition(_))
        ));
        assert!(matches!(
            load("options: { scenarios: { a: { vus: -1 } } }"),
            Err(Error::Definition(_))
        ));
    }

    #[test]
    fn durations_accept_numbers_and_strings() {
        let def = must_load(
            "options: { scenarios: { a: { duration: 3 }, b: { duration: 0.5 }, c: { duration: 1m } } }",
        );
        let durations: Vec<Option<Duration>> =
            def.scenarios.iter().map(|s| s.options.duration).collect();
        assert_eq!(
            durations,
            vec![
                Some(Duration::from_secs(3)),
                Some(Duration::from_millis(500)),
                Some(Duration::from_secs(60)),
            ]
        );
    }

    #[test]
    fn inline_definition_rejects_duplicates() {
        let scenario = ScenarioDefinition {
            name: "a".to_string(),
            options: ScenarioOptions::default(),
            action: Action::Noop,
        };
        let def = TestDefinition {
            scenarios: vec![scenario.clone(), scenario],
        };
        assert!(matches!(def.load(), Err(Error::DuplicateScenario(name)) if name == "a"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let src = YamlFile::new("/definitely/not/here.yaml");
        assert!(matches!(src.load(), Err(Error::ReadDefinition { .. })));
    }
}
