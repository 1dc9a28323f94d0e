use anyhow::{Context, Result};
use async_trait::async_trait;
use extract::{GraphElement, Node, NodeId, Properties, PropertyValue, Relationship};
use neo4rs::{BoltType, Graph, Query, Row};
use tracing::{debug, info};

use crate::store::{
    GraphExport, GraphStats, GraphStore, NodeNeighbourhood, OutgoingEdge, PathMatch, PathStep, Pattern, StoredNode,
    StoredRelationship,
};

pub struct Neo4jStore {
    graph: Graph,
}

/// Backtick-quote a label, relationship type or property key for Cypher.
fn escape(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

fn id_param(id: &NodeId) -> BoltType {
    match id {
        NodeId::Text(s) => BoltType::from(s.clone()),
        NodeId::Integer(n) => BoltType::from(*n),
    }
}

fn property_param(value: &PropertyValue) -> BoltType {
    match value {
        PropertyValue::Text(s) => BoltType::from(s.clone()),
        PropertyValue::Integer(n) => BoltType::from(*n),
        PropertyValue::Float(f) => BoltType::from(*f),
        PropertyValue::Boolean(b) => BoltType::from(*b),
    }
}

/// `SET var.key = $prefix0, ...` plus the parameters it references.
fn set_clause(var: &str, prefix: &str, properties: &Properties) -> (String, Vec<(String, BoltType)>) {
    if properties.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut assignments = Vec::new();
    let mut params = Vec::new();
    for (i, (key, value)) in properties.iter().enumerate() {
        let name = format!("{}{}", prefix, i);
        assignments.push(format!("{}.{} = ${}", var, escape(key), name));
        params.push((name, property_param(value)));
    }
    (format!(" SET {}", assignments.join(", ")), params)
}

fn node_query(node: &Node) -> Query {
    let (set, params) = set_clause("n", "p", &node.properties);
    let cypher = format!("MERGE (n:{} {{id: $id}}){}", escape(&node.node_type), set);

    params
        .into_iter()
        .fold(Query::new(cypher).param("id", id_param(&node.id)), |q, (k, v)| {
            q.param(&k, v)
        })
}

fn relationship_query(relationship: &Relationship) -> Query {
    let mut properties = relationship.properties.clone();
    if let Some(ts) = &relationship.timestamp {
        properties.insert("timestamp".to_string(), PropertyValue::Text(ts.clone()));
    }
    let (set, params) = set_clause("r", "p", &properties);

    let cypher = format!(
        "MATCH (a:{} {{id: $subj_id}}), (b:{} {{id: $obj_id}}) MERGE (a)-[r:{}]->(b){}",
        escape(&relationship.subj.node_type),
        escape(&relationship.obj.node_type),
        escape(&relationship.rel_type),
        set,
    );

    let query = Query::new(cypher)
        .param("subj_id", id_param(&relationship.subj.id))
        .param("obj_id", id_param(&relationship.obj.id));
    params.into_iter().fold(query, |q, (k, v)| q.param(&k, v))
}

fn pattern_cypher(pattern: &Pattern, limit: usize) -> String {
    let chain = pattern
        .relationships()
        .iter()
        .map(|r| format!("-[:{}]->", escape(r)))
        .collect::<Vec<_>>()
        .join("()");

    format!(
        r#"
        MATCH path = (start){chain}(end)
        RETURN [i IN range(0, size(relationships(path))-1) |
        {{
            from: toString(coalesce(nodes(path)[i].id, nodes(path)[i].name, labels(nodes(path)[i])[0])),
            rel: type(relationships(path)[i]),
            to: toString(coalesce(nodes(path)[i+1].id, nodes(path)[i+1].name, labels(nodes(path)[i+1])[0]))
        }}] AS connections
        LIMIT {limit}
        "#
    )
}

/// Cypher map literal `{label, id}` for node variable `var`. Nodes written
/// elsewhere may lack an `id`, so fall back to `name` and the element id.
fn node_ref_map(var: &str) -> String {
    format!("label: coalesce(labels({var})[0], ''), id: coalesce({var}.id, {var}.name, elementId({var}))")
}

/// `{label, id, properties}` for node variable `var`.
fn node_map(var: &str) -> String {
    format!("{{{}, properties: properties({var})}}", node_ref_map(var))
}

fn sample_cypher(label: Option<&str>, limit: usize) -> String {
    let pattern = match label {
        Some(label) => format!("(n:{})", escape(label)),
        None => "(n)".to_string(),
    };
    format!("MATCH {pattern} RETURN {} AS node LIMIT {limit}", node_map("n"))
}

fn search_cypher(property: &str, limit: usize) -> String {
    format!(
        "MATCH (n) WHERE toLower(toString(n.{})) CONTAINS toLower($needle) RETURN {} AS node LIMIT {limit}",
        escape(property),
        node_map("n")
    )
}

fn neighbourhood_cypher() -> String {
    format!(
        r#"
        MATCH (n) WHERE toString(n.id) = $key OR n.name = $key
        WITH n LIMIT 1
        OPTIONAL MATCH (n)-[r]->(m)
        RETURN {} AS node,
               collect(CASE WHEN r IS NULL THEN NULL ELSE {{type: type(r), target: {}}} END) AS relationships
        "#,
        node_map("n"),
        node_map("m")
    )
}

fn export_relationships_cypher() -> String {
    format!(
        "MATCH (a)-[r]->(b) RETURN {{source: {{{}}}, type: type(r), target: {{{}}}, properties: properties(r)}} AS relationship",
        node_ref_map("a"),
        node_ref_map("b")
    )
}

/// Read the `count` column. A missing or non-integer column is an error.
fn row_count(row: &Row) -> Result<usize> {
    let count: i64 = row.get("count").context("Missing count column")?;
    Ok(usize::try_from(count).unwrap_or(0))
}

impl Neo4jStore {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub async fn connect(uri: &str, username: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, username, password)
            .await
            .with_context(|| format!("Failed to connect to Neo4j at {}", uri))?;
        info!(uri, "Connected to Neo4j");
        Ok(Self::new(graph))
    }

    /// Initialize schema: create indexes
    pub async fn init_schema(&self, labels: &[&str]) -> Result<()> {
        for label in labels {
            let query = Query::new(format!(
                "CREATE INDEX {} IF NOT EXISTS FOR (n:{}) ON (n.id)",
                escape(&format!("{}_id_index", label.to_lowercase())),
                escape(label)
            ));
            self.graph.run(query).await
                .with_context(|| format!("Failed to create index on {}.id", label))?;
        }
        Ok(())
    }

    async fn count(&self, cypher: &str) -> Result<usize> {
        let mut result = self.graph.execute(Query::new(cypher.to_string())).await?;
        match result.next().await? {
            Some(row) => row_count(&row),
            None => Ok(0),
        }
    }

    async fn grouped_counts(&self, cypher: &str) -> Result<Vec<(String, usize)>> {
        let mut result = self.graph.execute(Query::new(cypher.to_string())).await?;
        let mut counts = Vec::new();
        while let Some(row) = result.next().await? {
            let key: String = row.get("key").context("Missing key column")?;
            counts.push((key, row_count(&row)?));
        }
        Ok(counts)
    }

    async fn nodes(&self, query: Query) -> Result<Vec<StoredNode>> {
        let mut result = self.graph.execute(query).await?;
        let mut nodes = Vec::new();
        while let Some(row) = result.next().await? {
            nodes.push(row.get::<StoredNode>("node").context("Malformed node row")?);
        }
        Ok(nodes)
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn write(&self, element: &GraphElement) -> Result<()> {
        let mut queries: Vec<Query> = element.nodes.iter().map(node_query).collect();
        queries.extend(element.relationships.iter().map(relationship_query));

        let mut txn = self.graph.start_txn().await
            .context("Failed to start Neo4j transaction")?;
        txn.run_queries(queries).await
            .with_context(|| format!("Failed to write graph elements for {}", element.source.element_id))?;
        txn.commit().await
            .context("Failed to commit Neo4j transaction")?;

        debug!(
            element_id = %element.source.element_id,
            nodes = element.nodes.len(),
            relationships = element.relationships.len(),
            "Stored graph elements in Neo4j"
        );
        Ok(())
    }

    async fn list_relationship_types(&self) -> Result<Vec<String>> {
        let query = Query::new(
            "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType".to_string(),
        );
        let mut result = self.graph.execute(query).await
            .context("Failed to list relationship types")?;

        let mut types = Vec::new();
        while let Some(row) = result.next().await? {
            types.push(row.get::<String>("relationshipType").context("Missing relationshipType")?);
        }
        Ok(types)
    }

    async fn run_pattern_query(&self, pattern: &Pattern, limit: usize) -> Result<Vec<PathMatch>> {
        if pattern.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let query = Query::new(pattern_cypher(pattern, limit));
        let mut result = self.graph.execute(query).await
            .with_context(|| format!("Failed to run pattern query for {}", pattern))?;

        let mut matches = Vec::new();
        while let Some(row) = result.next().await? {
            let steps: Vec<PathStep> = row.get("connections").context("Malformed path row")?;
            matches.push(PathMatch { steps });
        }
        Ok(matches)
    }

    async fn clear_all(&self) -> Result<()> {
        self.graph.run(Query::new("MATCH (n) DETACH DELETE n".to_string())).await
            .context("Failed to clear Neo4j database")?;
        info!("Neo4j database cleared");
        Ok(())
    }

    async fn stats(&self) -> Result<GraphStats> {
        let total_nodes = self.count("MATCH (n) RETURN count(n) as count").await?;
        let total_relationships = self.count("MATCH ()-[r]->() RETURN count(r) as count").await?;

        let node_labels = self
            .grouped_counts("MATCH (n) RETURN coalesce(labels(n)[0], '') as key, count(*) as count")
            .await?
            .into_iter()
            .collect();
        let relationship_types = self
            .grouped_counts("MATCH ()-[r]->() RETURN type(r) as key, count(*) as count")
            .await?
            .into_iter()
            .collect();

        Ok(GraphStats {
            total_nodes,
            total_relationships,
            node_labels,
            relationship_types,
        })
    }

    async fn export(&self) -> Result<GraphExport> {
        let nodes = self
            .nodes(Query::new(format!("MATCH (n) RETURN {} AS node", node_map("n"))))
            .await
            .context("Failed to export nodes")?;

        let mut result = self.graph.execute(Query::new(export_relationships_cypher())).await
            .context("Failed to export relationships")?;
        let mut relationships = Vec::new();
        while let Some(row) = result.next().await? {
            relationships.push(
                row.get::<StoredRelationship>("relationship")
                    .context("Malformed relationship row")?,
            );
        }

        info!(nodes = nodes.len(), relationships = relationships.len(), "Exported graph");
        Ok(GraphExport { nodes, relationships })
    }

    async fn sample_nodes(&self, label: Option<&str>, limit: usize) -> Result<Vec<StoredNode>> {
        self.nodes(Query::new(sample_cypher(label, limit)))
            .await
            .context("Failed to sample nodes")
    }

    async fn search_nodes(&self, property: &str, needle: &str, limit: usize) -> Result<Vec<StoredNode>> {
        let query = Query::new(search_cypher(property, limit)).param("needle", needle);
        self.nodes(query)
            .await
            .with_context(|| format!("Failed to search nodes by {}", property))
    }

    async fn node_relationships(&self, key: &str) -> Result<Option<NodeNeighbourhood>> {
        let query = Query::new(neighbourhood_cypher()).param("key", key);
        let mut result = self.graph.execute(query).await
            .with_context(|| format!("Failed to look up node {}", key))?;

        let Some(row) = result.next().await? else {
            return Ok(None);
        };
        let node: StoredNode = row.get("node").context("Malformed node row")?;
        let relationships: Vec<OutgoingEdge> = row.get("relationships").context("Malformed relationship list")?;
        Ok(Some(NodeNeighbourhood { node, relationships }))
    }

    async fn ping(&self) -> Result<()> {
        self.graph.run(Query::new("RETURN 1".to_string())).await
            .context("Neo4j is not reachable")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_backtick_escaped() {
        assert_eq!(escape("described_in"), "`described_in`");
        assert_eq!(escape("bad`label"), "`bad``label`");
    }

    #[test]
    fn pattern_query_chains_typed_edges() {
        let pattern: Pattern = ["responds_to", "described_in"].into_iter().collect();
        let cypher = pattern_cypher(&pattern, 5);

        assert!(cypher.contains("MATCH path = (start)-[:`responds_to`]->()-[:`described_in`]->(end)"));
        assert!(cypher.contains("LIMIT 5"));
        assert!(cypher.contains("coalesce(nodes(path)[i].id, nodes(path)[i].name, labels(nodes(path)[i])[0])"));
    }

    #[test]
    fn set_clause_numbers_parameters() {
        let mut properties = Properties::new();
        properties.insert("source".to_string(), PropertyValue::from("agent_created"));
        properties.insert("weight".to_string(), PropertyValue::Integer(2));

        let (set, params) = set_clause("n", "p", &properties);
        assert_eq!(set, " SET n.`source` = $p0, n.`weight` = $p1");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn count_decode_errors_are_not_zero() {
        use neo4rs::BoltList;

        let fields = BoltList::from(vec![BoltType::from("count")]);
        let good = Row::new(fields.clone(), BoltList::from(vec![BoltType::from(7_i64)]));
        assert_eq!(row_count(&good).unwrap(), 7);

        let bad = Row::new(fields, BoltList::from(vec![BoltType::from("seven")]));
        assert!(row_count(&bad).is_err());

        let missing = Row::new(
            BoltList::from(vec![BoltType::from("total")]),
            BoltList::from(vec![BoltType::from(7_i64)]),
        );
        assert!(row_count(&missing).is_err());
    }

    #[test]
    fn inspection_queries_escape_and_limit() {
        assert_eq!(
            sample_cypher(Some("SourceText"), 5),
            "MATCH (n:`SourceText`) RETURN {label: coalesce(labels(n)[0], ''), id: coalesce(n.id, n.name, elementId(n)), \
properties: properties(n)} AS node LIMIT 5"
        );
        assert!(sample_cypher(None, 3).starts_with("MATCH (n) RETURN"));

        let search = search_cypher("name`x", 10);
        assert!(search.contains("toLower(toString(n.`name``x`)) CONTAINS toLower($needle)"));
        assert!(search.ends_with("LIMIT 10"));
    }

    #[test]
    fn neighbourhood_keeps_outgoing_edges_only() {
        let cypher = neighbourhood_cypher();
        assert!(cypher.contains("OPTIONAL MATCH (n)-[r]->(m)"));
        assert!(cypher.contains("WITH n LIMIT 1"));
        assert!(cypher.contains("CASE WHEN r IS NULL THEN NULL"));
        assert!(export_relationships_cypher().starts_with("MATCH (a)-[r]->(b) RETURN {source: {label: coalesce(labels(a)[0], '')"));
    }

    #[test]
    fn empty_properties_need_no_set() {
        let (set, params) = set_clause("r", "p", &Properties::new());
        assert!(set.is_empty());
        assert!(params.is_empty());
    }
}
