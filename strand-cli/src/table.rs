/// Table formatting for query answers using comfy-table

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use std::collections::BTreeSet;
use strand_client::{Concept, ConceptMap};

/// Format a list of answers as a table
///
/// Collects every variable bound in any answer as a column; answers that do
/// not bind a variable show "-" in that column.
pub fn format_answers_table(answers: &[ConceptMap]) -> String {
    if answers.is_empty() {
        return "No answers".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    // BTreeSet keeps columns sorted for consistent display
    let columns: BTreeSet<&str> = answers
        .iter()
        .flat_map(|answer| answer.variables())
        .collect();

    table.set_header(
        columns
            .iter()
            .map(|var| Cell::new(format!("${}", var)))
            .collect::<Vec<_>>(),
    );

    for answer in answers {
        let row = columns
            .iter()
            .map(|var| match answer.get(var) {
                Some(concept) => Cell::new(format_concept(concept)),
                None => Cell::new("-"),
            })
            .collect::<Vec<_>>();
        table.add_row(row);
    }

    table.to_string()
}

/// Format a Concept for display in a table cell
fn format_concept(concept: &Concept) -> String {
    if concept.is_type {
        format!("{} (type)", concept.type_label)
    } else {
        format!("{}:{}", concept.type_label, concept.iid_hex())
    }
}

/// Answer as a JSON object keyed by variable
pub fn answer_to_json(answer: &ConceptMap) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    for var in answer.variables() {
        if let Some(concept) = answer.get(var) {
            obj.insert(var.to_string(), concept_to_json(concept));
        }
    }
    serde_json::Value::Object(obj)
}

fn concept_to_json(concept: &Concept) -> serde_json::Value {
    serde_json::json!({
        "type": concept.type_label,
        "iid": concept.iid_hex(),
        "is_type": concept.is_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use strand_client::Bytes;

    fn answer(bindings: &[(&str, &str, &[u8])]) -> ConceptMap {
        let mut map = HashMap::new();
        for (var, label, iid) in bindings {
            map.insert(
                var.to_string(),
                Concept {
                    iid: Bytes::copy_from_slice(iid),
                    type_label: label.to_string(),
                    is_type: false,
                },
            );
        }
        ConceptMap::new(map)
    }

    #[test]
    fn test_format_empty_answers() {
        assert_eq!(format_answers_table(&[]), "No answers");
    }

    #[test]
    fn test_format_answers() {
        let answers = vec![
            answer(&[("p", "person", &[0x01]), ("c", "company", &[0x02])]),
            answer(&[("p", "person", &[0x03])]),
        ];

        let output = format_answers_table(&answers);
        println!("{}", output);

        assert!(output.contains("$p"));
        assert!(output.contains("$c"));
        assert!(output.contains("person:0x01"));
        assert!(output.contains("company:0x02"));
        assert!(output.contains("-"));
    }

    #[test]
    fn test_format_type_concept() {
        let concept = Concept {
            iid: Bytes::new(),
            type_label: "person".to_string(),
            is_type: true,
        };
        assert_eq!(format_concept(&concept), "person (type)");
    }

    #[test]
    fn test_answer_to_json() {
        let json = answer_to_json(&answer(&[("p", "person", &[0xab])]));
        assert_eq!(json["p"]["type"], "person");
        assert_eq!(json["p"]["iid"], "0xab");
        assert_eq!(json["p"]["is_type"], false);
    }
}
