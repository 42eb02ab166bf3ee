use std::path::Path;

const MAX_COMMAND_CHARS: usize = 80;

/// One-line description of a tool call for the hook log.
pub fn tool_summary(tool_name: &str, tool_input: &serde_json::Value) -> String {
    let field = |key: &str| tool_input.get(key).and_then(|v| v.as_str());

    match tool_name {
        "Write" | "Edit" | "Read" => {
            let path = field("file_path").unwrap_or("unknown");
            let name = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string());
            format!("{tool_name}: {name}")
        }
        "Bash" => {
            let command = field("command").unwrap_or_default();
            if command.chars().count() > MAX_COMMAND_CHARS {
                let cut: String = command.chars().take(MAX_COMMAND_CHARS).collect();
                format!("{tool_name}: {cut}...")
            } else {
                format!("{tool_name}: {command}")
            }
        }
        "Glob" | "Grep" => format!("{tool_name}: {}", field("pattern").unwrap_or_default()),
        "Task" => format!("{tool_name}: {}", field("description").unwrap_or_default()),
        _ => tool_name.to_string(),
    }
}
