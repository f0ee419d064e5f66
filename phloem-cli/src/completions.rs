//! Shell completion support for --set overrides
//!
//! Valid override paths are read off the JSON Schema of [`ProfileConfig`], so they stay in sync
//! with the profile types.

use schemars::schema::{Schema, SchemaObject, SingleOrVec};
use schemars::schema_for;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::ProfileConfig;

/// Bash completion script that completes `--set` keys via `complete-paths`
pub fn generate_bash_completion(bin_name: &str) -> String {
    format!(
        r#"# Bash completion for {bin_name}
#   source <({bin_name} completions bash)

_{bin_name}() {{
    local cur prev words cword
    _init_completion || return

    if [[ "$prev" == "--set" && "$cur" != *"="* ]]; then
        COMPREPLY=( $(compgen -S "=" -W "$({bin_name} complete-paths 2>/dev/null)" -- "$cur") )
        compopt -o nospace
        return 0
    fi

    case "$prev" in
        -P|--profile)
            _filedir toml
            return 0
            ;;
        -l|--log-level)
            COMPREPLY=( $(compgen -W "trace debug info warn error" -- "$cur") )
            return 0
            ;;
    esac

    local flags="-P --profile --set -l --log-level -h --help -V --version"
    if [[ "$cur" == -* ]]; then
        COMPREPLY=( $(compgen -W "$flags" -- "$cur") )
    elif [[ $cword -eq 1 ]]; then
        COMPREPLY=( $(compgen -W "run completions schema help" -- "$cur") )
    elif [[ "${{words[1]}}" == "completions" ]]; then
        COMPREPLY=( $(compgen -W "bash zsh fish" -- "$cur") )
    fi
}}

complete -F _{bin_name} {bin_name}
"#
    )
}

/// All dot-notation paths accepted by `--set`
pub fn get_config_paths() -> Vec<String> {
    let schema = schema_for!(ProfileConfig);
    let mut paths = BTreeSet::new();
    collect_object(&schema.schema, "", &mut paths, &schema.definitions);
    paths.into_iter().collect()
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn collect_object(
    schema: &SchemaObject,
    prefix: &str,
    paths: &mut BTreeSet<String>,
    definitions: &BTreeMap<String, Schema>,
) {
    if !prefix.is_empty() {
        paths.insert(prefix.to_string());
    }

    if let Some(obj) = &schema.object {
        for (name, property) in &obj.properties {
            collect(property, &join(prefix, name), paths, definitions);
        }
    }

    // Tagged enums (key patterns, value sizes) and optional fields
    if let Some(subschemas) = &schema.subschemas {
        let variants = [&subschemas.one_of, &subschemas.any_of, &subschemas.all_of];
        for schemas in variants.into_iter().flatten() {
            for variant in schemas {
                collect(variant, prefix, paths, definitions);
            }
        }
    }

    // Arrays are completed with an index example
    if let Some(SingleOrVec::Single(item)) = schema.array.as_ref().and_then(|a| a.items.as_ref())
    {
        collect(item, &join(prefix, "0"), paths, definitions);
    }
}

fn collect(
    schema: &Schema,
    prefix: &str,
    paths: &mut BTreeSet<String>,
    definitions: &BTreeMap<String, Schema>,
) {
    let Schema::Object(obj) = schema else {
        return;
    };
    let referenced = obj
        .reference
        .as_deref()
        .and_then(|r| r.strip_prefix("#/definitions/"))
        .and_then(|name| definitions.get(name));
    match referenced {
        Some(definition) => collect(definition, prefix, paths, definitions),
        None => collect_object(obj, prefix, paths, definitions),
    }
}
