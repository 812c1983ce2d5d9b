//! DDF CSV directory loading
//!
//! A DDF directory holds one concept catalog and a file per table:
//!
//! - `ddf--concepts.csv`
//! - `ddf--entities--<domain>.csv` or `ddf--entities--<domain>--<set>.csv`
//! - `ddf--datapoints--<concept>--by--<dim1>--<dim2>.csv`
//!
//! Entity keys are kept as text; every other cell is parsed into a number,
//! boolean or text value.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::ReaderBuilder;
use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use dv_core::{Concept, ConceptType, Row, Space, Value};

use super::{Catalog, CatalogBuilder};
use crate::DataError;

const CONCEPTS_FILE: &str = "ddf--concepts.csv";
const ENTITIES_PREFIX: &str = "ddf--entities--";
const DATAPOINTS_PREFIX: &str = "ddf--datapoints--";
const BY_SEPARATOR: &str = "--by--";

/// Kind of table a DDF file holds, from its file name
#[derive(Debug, Clone, PartialEq)]
enum DdfFile {
    Entities { key: String },
    Datapoints { key: Space },
}

fn classify(file_name: &str) -> Option<DdfFile> {
    let stem = file_name.strip_suffix(".csv")?;
    if let Some(rest) = stem.strip_prefix(ENTITIES_PREFIX) {
        // the entity set, when present, is the key column
        let key = rest.rsplit("--").next()?.to_string();
        Some(DdfFile::Entities { key })
    } else if let Some(rest) = stem.strip_prefix(DATAPOINTS_PREFIX) {
        let (_, dims) = rest.split_once(BY_SEPARATOR)?;
        Some(DdfFile::Datapoints {
            key: Space::new(dims.split("--")),
        })
    } else {
        None
    }
}

/// Read every record of a CSV file as (headers, records)
fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>), DataError> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok((headers, records))
}

fn read_concepts(path: &Path) -> Result<Vec<Concept>, DataError> {
    let (headers, records) = read_csv(path)?;
    let mut concepts = Vec::with_capacity(records.len());

    for record in records {
        let mut id = None;
        let mut concept_type = ConceptType::Other;
        let mut domain = None;
        let mut properties = Map::new();

        for (header, cell) in headers.iter().zip(record) {
            if cell.is_empty() {
                continue;
            }
            match header.as_str() {
                "concept" => id = Some(cell),
                "concept_type" => {
                    concept_type = serde_json::from_value(Json::String(cell))
                        .unwrap_or(ConceptType::Other);
                }
                "domain" => domain = Some(cell),
                other => {
                    properties.insert(other.to_string(), Json::from(&Value::parse(&cell)));
                }
            }
        }

        let Some(id) = id else {
            warn!("Skipping concept row without an id in {}", path.display());
            continue;
        };
        let mut concept = Concept::new(id, concept_type);
        concept.domain = domain;
        concept.properties = properties;
        concepts.push(concept);
    }
    Ok(concepts)
}

fn read_rows<F>(path: &Path, keep_text: F) -> Result<Vec<Row>, DataError>
where
    F: Fn(&str) -> bool,
{
    let (headers, records) = read_csv(path)?;
    Ok(records
        .into_iter()
        .map(|record| {
            headers
                .iter()
                .zip(record)
                .map(|(header, cell)| {
                    let value = if cell.is_empty() {
                        Value::Null
                    } else if keep_text(header) {
                        Value::Text(cell)
                    } else {
                        Value::parse(&cell)
                    };
                    (header.clone(), value)
                })
                .collect()
        })
        .collect())
}

/// Load a DDF directory into a catalog. Blocking; run it on a blocking task.
pub fn load_ddf_dir(dir: &Path) -> Result<Catalog, DataError> {
    let concepts = read_concepts(&dir.join(CONCEPTS_FILE))?;
    let is_entity = |id: &str| {
        concepts
            .iter()
            .any(|c| c.concept == id && c.is_entity())
            || id.starts_with(dv_core::concept::EXISTENCE_FLAG_PREFIX)
    };

    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    files.sort();

    let mut builder = CatalogBuilder::default();
    for file in &files {
        let Some(kind) = classify(file) else {
            continue;
        };
        let path = dir.join(file);
        match kind {
            DdfFile::Entities { key } => {
                let rows = read_rows(&path, |header| header == key)?;
                debug!("Read {} entities of {} from {}", rows.len(), key, file);
                builder = builder.entities(&key, rows);
            }
            DdfFile::Datapoints { key } => {
                let rows = read_rows(&path, |header| key.contains(header) && is_entity(header))?;
                debug!("Read {} datapoints keyed {} from {}", rows.len(), key, file);
                builder = builder.datapoints(key, rows);
            }
        }
    }

    for concept in concepts {
        builder = builder.concept(concept);
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_sample_dir(dir: &Path) {
        fs::write(
            dir.join(CONCEPTS_FILE),
            "concept,concept_type,domain,name\n\
             geo,entity_domain,,Geography\n\
             country,entity_set,geo,Country\n\
             time,time,,Time\n\
             name,string,,Name\n\
             pop,measure,,Population\n",
        )
        .unwrap();
        fs::write(
            dir.join("ddf--entities--geo--country.csv"),
            "country,name,is--country\nswe,Sweden,TRUE\n001,Zero One,TRUE\n",
        )
        .unwrap();
        fs::write(
            dir.join("ddf--datapoints--pop--by--country--time.csv"),
            "country,time,pop\nswe,2000,8882792\nswe,2001,8909128\n001,2000,\n",
        )
        .unwrap();
    }

    #[test]
    fn test_classify_file_names() {
        assert_eq!(
            classify("ddf--entities--geo--country.csv"),
            Some(DdfFile::Entities { key: "country".into() })
        );
        assert_eq!(
            classify("ddf--entities--geo.csv"),
            Some(DdfFile::Entities { key: "geo".into() })
        );
        assert_eq!(
            classify("ddf--datapoints--pop--by--country--time.csv"),
            Some(DdfFile::Datapoints { key: Space::new(["country", "time"]) })
        );
        assert_eq!(classify("README.md"), None);
    }

    #[test]
    fn test_load_ddf_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_sample_dir(dir.path());

        let catalog = load_ddf_dir(dir.path()).unwrap();
        assert_eq!(catalog.concept("country").and_then(|c| c.domain.clone()), Some("geo".into()));
        assert_eq!(
            catalog.concept("pop").map(|c| c.field("name")),
            Some(Some(Json::from("Population")))
        );

        let availability = catalog.availability();
        let space = Space::new(["country", "time"]);
        assert!(availability.is_available(&space, "pop"));
        assert!(availability.is_available(&Space::new(["country"]), "name"));

        // entity keys stay text even when they look numeric
        let entities = catalog.table(&Space::new(["country"])).unwrap();
        assert!(entities.has_by_str("001"));
        let points = catalog.table(&space).unwrap();
        assert_eq!(
            points.get_by_str("swe¬2001").and_then(|r| r.get("time")),
            Some(&Value::from(2001))
        );
    }

    #[tokio::test]
    async fn test_open_as_source() {
        use crate::sources::InMemorySource;
        use dv_core::{DataSource, DdfQuery};

        let dir = tempfile::tempdir().unwrap();
        write_sample_dir(dir.path());

        let source = InMemorySource::from_ddf_dir("ddf", dir.path()).await.unwrap();
        source.metadata_ready().await.unwrap();
        let rows = source
            .query(&DdfQuery::new(&Space::new(["country", "time"]), "pop"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }
}
