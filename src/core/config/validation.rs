use anyhow::{anyhow, bail};
use serde_json::{Map, Value};

pub fn validate_config(config: &Value) -> anyhow::Result<()> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(database) = expect_optional_object(root, "database")? {
        validate_optional_string_field(database, "database.path", "path")?;
        validate_optional_string_field(database, "database.vector_path", "vector_path")?;
        validate_u64_field(
            database,
            "database.max_connections",
            "max_connections",
            1,
            64,
        )?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_url_field(llm, "llm.base_url", "base_url")?;
        validate_optional_string_field(llm, "llm.api_key_env", "api_key_env")?;
        validate_optional_string_field(llm, "llm.api_key", "api_key")?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 1_000_000)?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_url_field(embedding, "embedding.base_url", "base_url")?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.top_k", "top_k", 1, 100)?;
        validate_u64_field(
            retrieval,
            "retrieval.chunk_size",
            "chunk_size",
            1,
            1_000_000,
        )?;
        validate_u64_field(
            retrieval,
            "retrieval.chunk_overlap",
            "chunk_overlap",
            0,
            1_000_000,
        )?;

        let size = retrieval.get("chunk_size").and_then(Value::as_u64).unwrap_or(1000);
        let overlap = retrieval
            .get("chunk_overlap")
            .and_then(Value::as_u64)
            .unwrap_or(200);
        if overlap >= size {
            bail!(
                "Invalid config at 'retrieval.chunk_overlap': must be smaller than chunk_size ({})",
                size
            );
        }
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> anyhow::Result<Option<&'a Map<String, Value>>> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> anyhow::Result<()> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        bail!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        );
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> anyhow::Result<()> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() || value.as_str().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "string"))
}

fn validate_url_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> anyhow::Result<()> {
    validate_optional_string_field(section, path, key)?;
    let Some(url) = section.get(key).and_then(Value::as_str) else {
        return Ok(());
    };
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(());
    }
    Err(anyhow!(
        "Invalid config at '{}': must be an http(s) URL",
        path
    ))
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> anyhow::Result<()> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            bail!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            );
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> anyhow::Error {
    anyhow!("Invalid config at '{}': expected {}", path, expected)
}
