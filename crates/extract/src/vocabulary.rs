//! Entity and relationship categories the extraction prompt asks for.
//!
//! The parser does not enforce these: an off-vocabulary type is still stored,
//! it is only counted so the caller can tell when the model drifts.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    ClinicalObservation,
    TherapeuticOutcome,
    ContextualFactor,
    MechanisticConcept,
    TherapeuticApproach,
    SourceText,
}

impl NodeCategory {
    pub const ALL: [NodeCategory; 6] = [
        NodeCategory::ClinicalObservation,
        NodeCategory::TherapeuticOutcome,
        NodeCategory::ContextualFactor,
        NodeCategory::MechanisticConcept,
        NodeCategory::TherapeuticApproach,
        NodeCategory::SourceText,
    ];

    pub fn label(self) -> &'static str {
        match self {
            NodeCategory::ClinicalObservation => "ClinicalObservation",
            NodeCategory::TherapeuticOutcome => "TherapeuticOutcome",
            NodeCategory::ContextualFactor => "ContextualFactor",
            NodeCategory::MechanisticConcept => "MechanisticConcept",
            NodeCategory::TherapeuticApproach => "TherapeuticApproach",
            NodeCategory::SourceText => "SourceText",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            NodeCategory::ClinicalObservation => "signs, symptoms, disease presentations",
            NodeCategory::TherapeuticOutcome => "treatment responses, recovery patterns",
            NodeCategory::ContextualFactor => "environmental, behavioral, constitutional factors",
            NodeCategory::MechanisticConcept => "traditional explanatory models, processes",
            NodeCategory::TherapeuticApproach => "interventions, remedies, methods",
            NodeCategory::SourceText => "reference to original documents or authors",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipCategory {
    CoOccursWith,
    PrecededBy,
    FollowedBy,
    ModifiedBy,
    RespondsTo,
    AssociatedWith,
    ResultsIn,
    DescribedIn,
    Contradicts,
    Corroborates,
}

impl RelationshipCategory {
    pub const ALL: [RelationshipCategory; 10] = [
        RelationshipCategory::CoOccursWith,
        RelationshipCategory::PrecededBy,
        RelationshipCategory::FollowedBy,
        RelationshipCategory::ModifiedBy,
        RelationshipCategory::RespondsTo,
        RelationshipCategory::AssociatedWith,
        RelationshipCategory::ResultsIn,
        RelationshipCategory::DescribedIn,
        RelationshipCategory::Contradicts,
        RelationshipCategory::Corroborates,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RelationshipCategory::CoOccursWith => "co_occurs_with",
            RelationshipCategory::PrecededBy => "preceded_by",
            RelationshipCategory::FollowedBy => "followed_by",
            RelationshipCategory::ModifiedBy => "modified_by",
            RelationshipCategory::RespondsTo => "responds_to",
            RelationshipCategory::AssociatedWith => "associated_with",
            RelationshipCategory::ResultsIn => "results_in",
            RelationshipCategory::DescribedIn => "described_in",
            RelationshipCategory::Contradicts => "contradicts",
            RelationshipCategory::Corroborates => "corroborates",
        }
    }

    /// Case-insensitive, since stores commonly upper-case relationship types.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }
}

/// Prompt lines for the relationship section. Paired categories share a line.
pub(crate) fn relationship_prompt_lines() -> Vec<String> {
    use RelationshipCategory::*;

    let groups: [(&[RelationshipCategory], &str); 8] = [
        (&[CoOccursWith], "between related clinical observations"),
        (&[PrecededBy, FollowedBy], "temporal relationships"),
        (&[ModifiedBy], "how contexts affect observations"),
        (&[RespondsTo], "observation responses to treatments"),
        (&[AssociatedWith], "contextual associations with observations"),
        (&[ResultsIn], "effects produced by treatments"),
        (&[DescribedIn], "attribution to source texts"),
        (&[Contradicts, Corroborates], "consistency relationships"),
    ];

    groups
        .iter()
        .map(|(cats, what)| {
            let names: Vec<&str> = cats.iter().map(|c| c.name()).collect();
            format!("- {} ({})", names.join("/"), what)
        })
        .collect()
}
