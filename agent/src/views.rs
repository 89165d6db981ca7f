//! HTML 页面
//!
//! 页面很少且结构固定，直接用 `format!` 拼接；所有动态内容都先转义。

use serde_json::Value;

use common::errors::AppResult;
use common::models::schema::PreviewResult;

/// Escapes HTML special characters.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; margin: 2rem; }}
table {{ border-collapse: collapse; margin-bottom: 1.5rem; }}
th, td {{ border: 1px solid #ccc; padding: 4px 8px; text-align: left; }}
.error {{ color: #b00020; }}
.synced {{ color: #1b5e20; }}
</style>
</head>
<body>
{body}
</body>
</html>"#,
        title = html_escape(title),
        body = body
    )
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => html_escape(s),
        other => html_escape(&other.to_string()),
    }
}

fn preview_table(preview: &PreviewResult) -> String {
    let head: String = preview
        .columns
        .iter()
        .map(|c| format!("<th>{}</th>", html_escape(c)))
        .collect();
    let rows: String = preview
        .rows
        .iter()
        .map(|row| {
            let cells: String = row.iter().map(|v| format!("<td>{}</td>", cell(v))).collect();
            format!("<tr>{}</tr>", cells)
        })
        .collect();
    format!("<table><thead><tr>{}</tr></thead><tbody>{}</tbody></table>", head, rows)
}

pub fn login(error: Option<&str>) -> String {
    let error = error
        .map(|e| format!(r#"<p class="error">{}</p>"#, html_escape(e)))
        .unwrap_or_default();
    page(
        "Login",
        &format!(
            r#"<h1>Bridge agent</h1>
{error}
<form method="post" action="/login">
<label>Access token <input type="password" name="token" autocomplete="off"></label>
<button type="submit">Login</button>
</form>"#
        ),
    )
}

/// One DB2 database row on the dashboard.
pub struct DatabaseEntry {
    pub name: String,
    pub synced: bool,
}

pub fn dashboard(databases: &[DatabaseEntry], tables: &AppResult<Vec<String>>) -> String {
    let first_db = databases
        .first()
        .map(|db| html_escape(&db.name))
        .unwrap_or_default();
    let databases: String = databases
        .iter()
        .map(|db| {
            let name = html_escape(&db.name);
            let (status, action, label) = if db.synced {
                (r#"<span class="synced">synced</span>"#, "unsync_db", "Unsync")
            } else {
                ("not synced", "sync_db", "Sync")
            };
            format!(
                r#"<tr><td>{name}</td><td>{status}</td><td><button data-action="/{action}/{name}">{label}</button></td></tr>"#
            )
        })
        .collect();

    let tables = match tables {
        Ok(tables) if tables.is_empty() => "<p>No tables found.</p>".to_string(),
        Ok(tables) => {
            let items: String = tables
                .iter()
                .map(|t| {
                    format!(
                        r#"<li><label><input type="checkbox" name="table" value="{0}"> {0}</label></li>"#,
                        html_escape(t)
                    )
                })
                .collect();
            format!(
                r#"<form id="preview"><ul>{items}</ul><button type="submit">Preview selected</button></form>"#
            )
        }
        Err(e) => format!(r#"<p class="error">{}</p>"#, html_escape(&e.to_string())),
    };

    let connect_form = |action: &str, title: &str, port: u16| {
        format!(
            r#"<h3>{title}</h3>
<form method="post" action="{action}">
<input name="host" placeholder="host" value="localhost">
<input name="port" placeholder="port" value="{port}">
<input name="username" placeholder="username">
<input name="password" type="password" placeholder="password">
<input name="database" placeholder="database">
<button type="submit">Connect &amp; sync</button>
</form>"#
        )
    };

    page(
        "Dashboard",
        &format!(
            r#"<h1>Dashboard</h1>
<p><a href="/logout">Logout</a></p>
<h2>DB2 databases</h2>
<table><thead><tr><th>Database</th><th>Status</th><th></th></tr></thead><tbody>{databases}</tbody></table>
<h2>Tables</h2>
{tables}
<h2>Other databases</h2>
{mysql}
{postgres}
<h3>PostgreSQL preview</h3>
<form method="post" action="/preview-postgres">
<input name="dbname" placeholder="database">
<input name="table" placeholder="schema.table">
<button type="submit">Preview</button>
</form>
<h2>Tally</h2>
<button data-action="/sync-tally">Sync Tally</button>
<script>
document.querySelectorAll("button[data-action]").forEach(function (b) {{
  b.addEventListener("click", function () {{
    fetch(b.dataset.action, {{ method: "POST" }}).then(function () {{ location.reload(); }});
  }});
}});
var preview = document.getElementById("preview");
if (preview) {{
  preview.addEventListener("submit", function (e) {{
    e.preventDefault();
    var picked = Array.from(preview.querySelectorAll("input:checked")).map(function (i) {{ return encodeURIComponent(i.value); }});
    if (picked.length) {{ location.href = "/preview/" + encodeURIComponent("{first_db}") + "/" + picked.join(","); }}
  }});
}}
</script>"#,
            mysql = connect_form("/connect-mysql", "MySQL", 3306),
            postgres = connect_form("/connect-postgres", "PostgreSQL", 5432),
        ),
    )
}

/// Preview of several tables of one database; failures are shown per table.
pub fn previews(database: &str, previews: &[(String, AppResult<PreviewResult>)]) -> String {
    let sections: String = previews
        .iter()
        .map(|(table, result)| {
            let content = match result {
                Ok(preview) if preview.rows.is_empty() => {
                    format!("{}<p>No rows.</p>", preview_table(preview))
                }
                Ok(preview) => preview_table(preview),
                Err(e) => format!(r#"<p class="error">{}</p>"#, html_escape(&e.to_string())),
            };
            format!("<h2>{}</h2>{}", html_escape(table), content)
        })
        .collect();
    page(
        &format!("Preview {}", database),
        &format!(
            r#"<h1>{}</h1><p><a href="/dashboard">Back</a></p>{}"#,
            html_escape(database),
            sections
        ),
    )
}

/// Column list plus preview rows for one PostgreSQL table.
pub fn postgres_preview(database: &str, table: &str, columns: &[String], preview: &PreviewResult) -> String {
    let columns: String = columns
        .iter()
        .map(|c| format!("<li>{}</li>", html_escape(c)))
        .collect();
    page(
        &format!("{} / {}", database, table),
        &format!(
            r#"<h1>{} / {}</h1><p><a href="/dashboard">Back</a></p><h2>Columns</h2><ul>{}</ul><h2>Rows</h2>{}"#,
            html_escape(database),
            html_escape(table),
            columns,
            preview_table(preview)
        ),
    )
}

/// Error page for HTML routes.
pub fn error(title: &str, message: &str) -> String {
    page(
        title,
        &format!(
            r#"<h1>{}</h1><p class="error">{}</p><p><a href="/dashboard">Back</a></p>"#,
            html_escape(title),
            html_escape(message)
        ),
    )
}
