//! Output helpers for human and JSON modes.
//!
//! Human mode renders entities as short lines and tables on stdout. JSON
//! mode prints the response body as received, pretty with `--pretty`.

use anyhow::Result;
use cmdq_protocol::Entity;
use serde::Serialize;

use crate::opts::ClientOpts;

pub fn print_json<T: Serialize>(opts: &ClientOpts, value: &T) -> Result<()> {
    if opts.pretty {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}

pub fn print_entity(entity: &Entity) {
    match entity {
        Entity::CommandStatus(status) => {
            let state = serde_json::to_value(status.status)
                .ok()
                .and_then(|v| v.as_str().map(str::to_uppercase))
                .unwrap_or_default();
            println!(
                "{} [offset {}] {}: {}",
                state, status.command_sequence_number, status.statement_text, status.message
            );
        }
        Entity::PrintTopic(print) => {
            let mut line = format!(
                "printing topic {} from {} every {} record(s)",
                print.topic,
                if print.from_beginning { "beginning" } else { "latest" },
                print.interval
            );
            if let Some(limit) = print.limit {
                line.push_str(&format!(", limit {limit}"));
            }
            println!("{line}");
        }
        Entity::TopicList(list) => {
            let rows: Vec<Vec<String>> = list.topics.iter().map(|t| vec![t.clone()]).collect();
            print!("{}", render_table(&["Topic Name"], &rows));
        }
        Entity::PropertyList(list) => {
            let rows: Vec<Vec<String>> = list
                .properties
                .iter()
                .map(|(name, value)| {
                    let value = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    vec![name.clone(), value]
                })
                .collect();
            print!("{}", render_table(&["Property", "Value"], &rows));
        }
        Entity::FunctionNameList(list) => {
            let rows: Vec<Vec<String>> = list
                .sorted_rows()
                .into_iter()
                .map(|row| row.to_vec())
                .collect();
            print!("{}", render_table(&["Function Name", "Type"], &rows));
        }
    }
}

/// Left-aligned columns separated by `|`, with a dashed rule under the header.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let mut out = table_line(headers.iter().copied(), &widths);
    let rule_len = widths.iter().map(|w| w + 2).sum::<usize>() + widths.len().saturating_sub(1);
    out.push_str(&"-".repeat(rule_len));
    out.push('\n');
    for row in rows {
        out.push_str(&table_line(row.iter().map(String::as_str), &widths));
    }
    out
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &width)| format!(" {cell:<width$} "))
        .collect();
    format!("{}\n", padded.join("|").trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_columns_to_widest_cell() {
        let rows = vec![
            vec!["ABS".to_string(), "SCALAR".to_string()],
            vec!["COLLECT_LIST".to_string(), "AGGREGATE".to_string()],
        ];
        let table = render_table(&["Function Name", "Type"], &rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], " Function Name | Type");
        assert_eq!(lines[1], "-".repeat(15 + 1 + 11));
        assert_eq!(lines[2], " ABS           | SCALAR");
        assert_eq!(lines[3], " COLLECT_LIST  | AGGREGATE");
    }

    #[test]
    fn empty_table_still_has_header() {
        let table = render_table(&["Topic Name"], &[]);
        assert_eq!(table, " Topic Name\n------------\n");
    }
}
