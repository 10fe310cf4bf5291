use std::io::Write;

use volley_core::{DefinitionSource, Error, YamlFile};

#[test]
fn yaml_file_loads_from_disk() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        "options:\n  scenarios:\n    smoke: {{ executor: per-vu-iterations, vus: 1, iterations: 2 }}"
    )?;

    let source = YamlFile::new(file.path());
    anyhow::ensure!(source.label() == file.path().display().to_string());

    let Some(def) = source.load()? else {
        anyhow::bail!("expected scenarios");
    };
    anyhow::ensure!(def.scenarios.len() == 1);
    anyhow::ensure!(def.scenarios[0].name == "smoke");
    anyhow::ensure!(def.scenarios[0].options.iterations == Some(2));
    Ok(())
}

#[test]
fn malformed_yaml_is_a_definition_error() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "options: [unclosed")?;

    match YamlFile::new(file.path()).load() {
        Err(Error::Definition(_)) => Ok(()),
        other => anyhow::bail!("expected definition error, got {other:?}"),
    }
}
