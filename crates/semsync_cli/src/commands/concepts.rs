use semsync::concept::{Concept, ConceptData};
use serde::Serialize;

use crate::commands::shared::{CommandResult, OutputFormat, Session};
use crate::config::Config;

/// One row of `semsync list`.
#[derive(Debug, Serialize, tabled::Tabled)]
pub(crate) struct ConceptRow {
    #[tabled(rename = "Id")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Relationships")]
    pub relationships: usize,
    #[tabled(rename = "Created")]
    pub created_at: String,
}

impl From<&Concept> for ConceptRow {
    fn from(concept: &Concept) -> Self {
        Self {
            id: concept.id.clone(),
            name: concept.name.clone().unwrap_or_default(),
            relationships: concept.relationships.values().map(Vec::len).sum(),
            created_at: concept.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Build concept attributes from command-line values.
///
/// Relationships are given as `RELATION=TARGET`.
pub(crate) fn concept_data(
    name: Option<String>,
    description: Option<String>,
    color: Option<String>,
    relationships: &[String],
) -> CommandResult<ConceptData> {
    let mut data = ConceptData {
        name,
        description,
        color,
        ..ConceptData::default()
    };
    for raw in relationships {
        let Some((relation, target)) = raw.split_once('=') else {
            return Err(format!("relationship '{raw}' is not RELATION=TARGET").into());
        };
        let (relation, target) = (relation.trim(), target.trim());
        if relation.is_empty() || target.is_empty() {
            return Err(format!("relationship '{raw}' is not RELATION=TARGET").into());
        }
        data = data.with_relationship(relation, target);
    }
    Ok(data)
}

pub(crate) async fn handle_list(config: &Config, output: OutputFormat) -> CommandResult {
    let session = Session::open_loaded(config).await?;
    let concepts = session.engine.get_all_concepts();
    match output {
        OutputFormat::Table => output.print(concepts.iter().map(ConceptRow::from).collect()),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&concepts)?);
            Ok(())
        }
    }
}

pub(crate) async fn handle_create(config: &Config, id: String, data: ConceptData) -> CommandResult {
    let session = Session::open_loaded(config).await?;
    let replaced = session.engine.get_concept(&id).is_some();
    let concept = session.engine.create_concept(id, data);
    session.finish().await?;

    let verb = if replaced { "Replaced" } else { "Created" };
    println!("{verb} concept {}", concept.id);
    Ok(())
}

pub(crate) async fn handle_delete(config: &Config, id: &str) -> CommandResult {
    let session = Session::open_loaded(config).await?;
    if !session.engine.delete_concept(id) {
        return Err(format!("concept '{id}' not found").into());
    }
    session.finish().await?;

    println!("Deleted concept {id}");
    Ok(())
}
