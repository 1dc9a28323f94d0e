use crate::vocabulary::{NodeCategory, relationship_prompt_lines};

pub const SYSTEM_MESSAGE: &str = "Your mission is to transform unstructured content \
into structured graph data. Extract nodes and relationships with precision, and let the \
connections unfold. Your graphs will illuminate the hidden connections within the chaos \
of information.";

pub const EXAMPLE_CONTENT: &str = "Ollivier describes cases of paralysis linked to spinal \
blood congestions, where an accumulation of blood in the spinal veins leads to symptoms like \
incomplete paralysis without intellectual impairment. He notes that these congestions often \
resolve spontaneously.";

pub const EXAMPLE_OUTPUT: &str = r#"Nodes:
Node(id='paralysis_spinal_blood_congestion', type='ClinicalObservation')
Node(id='incomplete_paralysis', type='ClinicalObservation')
Node(id='preserved_intellect', type='ClinicalObservation')
Node(id='blood_accumulation_spinal_veins', type='MechanisticConcept')
Node(id='spontaneous_resolution', type='TherapeuticOutcome')
Node(id='Ollivier', type='SourceText')

Relationships:
Relationship(subj=Node(id='blood_accumulation_spinal_veins', type='MechanisticConcept'), obj=Node(id='paralysis_spinal_blood_congestion', type='ClinicalObservation'), type='associated_with')
Relationship(subj=Node(id='paralysis_spinal_blood_congestion', type='ClinicalObservation'), obj=Node(id='incomplete_paralysis', type='ClinicalObservation'), type='co_occurs_with')
Relationship(subj=Node(id='paralysis_spinal_blood_congestion', type='ClinicalObservation'), obj=Node(id='preserved_intellect', type='ClinicalObservation'), type='co_occurs_with')
Relationship(subj=Node(id='paralysis_spinal_blood_congestion', type='ClinicalObservation'), obj=Node(id='spontaneous_resolution', type='TherapeuticOutcome'), type='results_in')
Relationship(subj=Node(id='paralysis_spinal_blood_congestion', type='ClinicalObservation'), obj=Node(id='Ollivier', type='SourceText'), type='described_in')"#;

pub fn build_extraction_prompt(chunk_text: &str) -> String {
    let node_types: Vec<String> = NodeCategory::ALL
        .iter()
        .map(|c| format!("- {} ({})", c.label(), c.description()))
        .collect();

    format!(
        r#"You are tasked with extracting entities (nodes) and relationships from historical spine science texts and traditional medicine documents, then structuring them into Node and Relationship objects. Whatever the language of the documents, your extracted nodes and relationships should be translated in English. Here's the outline of what you need to do:

Content Extraction:
You should be able to process input content and identify entities mentioned within it.
Focus on entities related to historical spine treatments, observations, and medical concepts.

Node Extraction:
For each identified entity, create a Node object.
Each Node object should have a unique identifier (id) and a type (type).
Node types should be one of the following:
{node_types}

Relationship Extraction:
Identify relationships between extracted entities in the content.
For each relationship, create a Relationship object.
A Relationship object should have a subject (subj) and an object (obj) which are Node objects.
Each relationship should have a type (type) from the following options:
{relationship_types}

Output Formatting:
Output one Node or Relationship per line, exactly in the format of the example output.
Do not wrap the output in lists or dictionaries, and give every Node a unique identifier.
Do not add any additional information.

Example Content:
"{example_content}"

Expected Output:
{example_output}

===== TASK =====
Please extract nodes and relationships from the given content and structure them into Node and Relationship objects.

{task}
"#,
        node_types = node_types.join("\n"),
        relationship_types = relationship_prompt_lines().join("\n"),
        example_content = EXAMPLE_CONTENT,
        example_output = EXAMPLE_OUTPUT,
        task = chunk_text,
    )
}
