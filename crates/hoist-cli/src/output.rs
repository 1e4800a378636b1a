use serde_json::Value;

/// Render the execution list as a fixed-width table.
pub fn render_executions(executions: &Value) -> String {
    let Some(list) = executions.as_array() else {
        return "No executions.\n".to_string();
    };
    if list.is_empty() {
        return "No executions.\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!(
        "{:<38} {:<20} {:<10} {:<12} {:<10} {}\n",
        "EXECUTION", "MODULE", "VERSION", "ENV", "STRATEGY", "STATUS"
    ));
    for execution in list {
        let request = &execution["request"];
        let module = &request["module"];
        let version = &module["version"];
        out.push_str(&format!(
            "{:<38} {:<20} {:<10} {:<12} {:<10} {}\n",
            execution["execution_id"].as_str().unwrap_or("?"),
            module["name"].as_str().unwrap_or("?"),
            format!(
                "{}.{}.{}",
                version["major"], version["minor"], version["patch"]
            ),
            request["target_environment"].as_str().unwrap_or("?"),
            request["strategy"].as_str().unwrap_or("?"),
            execution["status"].as_str().unwrap_or("?"),
        ));
    }
    out
}

/// Render one execution with its stage history.
pub fn render_execution(execution: &Value) -> String {
    let request = &execution["request"];
    let module = &execution["request"]["module"];
    let version = &module["version"];
    let mut out = String::new();
    out.push_str(&format!(
        "Execution {}\n  module: {} {}.{}.{}\n  environment: {}\n  strategy: {}\n  status: {}\n",
        execution["execution_id"].as_str().unwrap_or("?"),
        module["name"].as_str().unwrap_or("?"),
        version["major"],
        version["minor"],
        version["patch"],
        request["target_environment"].as_str().unwrap_or("?"),
        request["strategy"].as_str().unwrap_or("?"),
        execution["status"].as_str().unwrap_or("?"),
    ));

    if let Some(stages) = execution["stages"].as_array() {
        out.push_str("  stages:\n");
        for stage in stages {
            let marker = match stage["status"].as_str().unwrap_or("") {
                "succeeded" => "✓",
                "failed" => "✗",
                "skipped" => "-",
                "running" => "…",
                _ => "?",
            };
            let mut line = format!(
                "    {} {:<16} {}",
                marker,
                stage["name"].as_str().unwrap_or("?"),
                stage["message"].as_str().unwrap_or(""),
            );
            let deployed = stage["nodes_deployed"].as_u64().unwrap_or(0);
            let failed = stage["nodes_failed"].as_u64().unwrap_or(0);
            if deployed > 0 || failed > 0 {
                line.push_str(&format!(" [{deployed} deployed, {failed} failed]"));
            }
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

pub fn render_topics(topics: &Value) -> String {
    let Some(list) = topics.as_array() else {
        return "No topics.\n".to_string();
    };
    if list.is_empty() {
        return "No topics.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!(
        "{:<30} {:<8} {:<14} {:<11} {}\n",
        "TOPIC", "TYPE", "GUARANTEE", "PARTITIONS", "SCHEMA"
    ));
    for topic in list {
        out.push_str(&format!(
            "{:<30} {:<8} {:<14} {:<11} {}\n",
            topic["name"].as_str().unwrap_or("?"),
            topic["topic_type"].as_str().unwrap_or("?"),
            topic["delivery_guarantee"].as_str().unwrap_or("?"),
            topic["partition_count"],
            topic["schema_id"].as_str().unwrap_or("-"),
        ));
    }
    out
}

pub fn render_schemas(schemas: &Value) -> String {
    let Some(list) = schemas.as_array() else {
        return "No schemas.\n".to_string();
    };
    if list.is_empty() {
        return "No schemas.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!(
        "{:<30} {:<9} {:<17} {:<13} {}\n",
        "SCHEMA", "VERSION", "STATUS", "COMPAT", "APPROVED BY"
    ));
    for schema in list {
        out.push_str(&format!(
            "{:<30} {:<9} {:<17} {:<13} {}\n",
            schema["schema_id"].as_str().unwrap_or("?"),
            schema["version"],
            schema["status"].as_str().unwrap_or("?"),
            schema["compatibility"].as_str().unwrap_or("?"),
            schema["approved_by"].as_str().unwrap_or("-"),
        ));
    }
    out
}

pub fn render_status(status: &Value) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Broker health: {}\nTopics: {}\nExecutions: {} ({} in progress)\n",
        status["broker_health"].as_str().unwrap_or("unknown"),
        status["topics"],
        status["executions"],
        status["executions_in_progress"],
    ));
    if let Some(environments) = status["environments"].as_array() {
        for env in environments {
            let health = &env["health"];
            out.push_str(&format!(
                "Cluster {}: {}/{} nodes healthy\n",
                env["environment"].as_str().unwrap_or("?"),
                health["healthy_nodes"],
                health["total_nodes"],
            ));
        }
    }
    out
}
