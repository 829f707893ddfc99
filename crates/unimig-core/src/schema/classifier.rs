//! Column classification from name tokens cross-checked against declared types.

use crate::connector::SourceColumn;
use crate::vocabulary::{snake_case, split_words, ColumnVocabulary};

use super::types::{ColumnClassification, TypeFamily};

/// Confidence when name pattern and type agree.
const AGREE: f64 = 0.85;
/// Confidence when agreement is backed by a key constraint.
const AGREE_STRUCTURAL: f64 = 0.95;
/// Confidence when name pattern and type disagree.
const DISAGREE: f64 = 0.35;
/// Confidence when only the type carries a signal.
const TYPE_ONLY: f64 = 0.5;
/// Confidence when nothing carries a signal.
const NO_SIGNAL: f64 = 0.3;

/// Outcome of classifying one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub classification: ColumnClassification,
    pub confidence: f64,
    pub manual_review: bool,
    pub business_meaning: String,
    pub suggested_field: String,
}

/// Structural facts about a column known from the table definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyRole {
    pub primary_key: bool,
    pub foreign_key: bool,
    pub unique: bool,
}

/// Classifies columns against a column vocabulary.
pub struct ColumnClassifier<'a> {
    vocab: &'a ColumnVocabulary,
}

impl<'a> ColumnClassifier<'a> {
    pub fn new(vocab: &'a ColumnVocabulary) -> Self {
        Self { vocab }
    }

    /// Classify a column.
    pub fn classify(&self, column: &SourceColumn, role: KeyRole) -> Classification {
        let words = split_words(&column.name);
        let family = TypeFamily::from_declared(&column.data_type);
        let from_name = self.name_signal(&words);
        let structural = role.primary_key || role.foreign_key || role.unique;

        let (classification, confidence, manual_review) = if role.foreign_key {
            let confidence = match from_name {
                Some(ColumnClassification::Identifier) | Some(ColumnClassification::Reference) => {
                    AGREE_STRUCTURAL
                }
                _ => AGREE,
            };
            (ColumnClassification::Reference, confidence, false)
        } else {
            match from_name {
                Some(class) if type_agrees(class, family, column.max_length) => {
                    let confidence = if structural { AGREE_STRUCTURAL } else { AGREE };
                    (class, confidence, false)
                }
                Some(class) => (class, DISAGREE, true),
                None if role.primary_key => (ColumnClassification::Identifier, AGREE, false),
                None => match type_only(family) {
                    Some(class) => (class, TYPE_ONLY, false),
                    None => (ColumnClassification::Other, NO_SIGNAL, false),
                },
            }
        };

        Classification {
            classification,
            confidence,
            manual_review,
            business_meaning: describe(&words, classification, role),
            suggested_field: snake_case(&column.name),
        }
    }

    fn name_signal(&self, words: &[String]) -> Option<ColumnClassification> {
        let first = words.first()?;
        let last = words.last()?;
        let has = |list: &[String], word: &str| list.iter().any(|w| w == word);
        let joined: String = words.concat();

        if words.len() > 1 && has(&self.vocab.flag_prefixes, first) {
            return Some(ColumnClassification::Flag);
        }
        if has(&self.vocab.flag_suffixes, last) {
            return Some(ColumnClassification::Flag);
        }
        if words.len() > 1 && has(&self.vocab.reference, first) {
            return Some(ColumnClassification::Reference);
        }
        if has(&self.vocab.identifier, last) {
            return Some(ColumnClassification::Identifier);
        }
        if has(&self.vocab.name, last) || has(&self.vocab.name, &joined) {
            return Some(ColumnClassification::Name);
        }
        if has(&self.vocab.description, last) {
            return Some(ColumnClassification::Description);
        }
        if has(&self.vocab.amount, last) || has(&self.vocab.amount, &joined) {
            return Some(ColumnClassification::Amount);
        }
        if has(&self.vocab.date, last) || (words.len() > 1 && has(&self.vocab.date, first)) {
            return Some(ColumnClassification::Date);
        }
        None
    }
}

fn type_agrees(class: ColumnClassification, family: TypeFamily, max_length: Option<u32>) -> bool {
    use ColumnClassification as C;
    use TypeFamily as T;
    match class {
        C::Identifier => matches!(family, T::Integer | T::Text | T::Uuid),
        C::Name | C::Description => family == T::Text,
        C::Amount => matches!(family, T::Integer | T::Decimal),
        C::Date => family == T::Temporal,
        C::Flag => match family {
            T::Boolean | T::Integer => true,
            T::Text => max_length.map(|len| len <= 1).unwrap_or(false),
            _ => false,
        },
        C::Reference | C::Other => true,
    }
}

fn type_only(family: TypeFamily) -> Option<ColumnClassification> {
    match family {
        TypeFamily::Boolean => Some(ColumnClassification::Flag),
        TypeFamily::Temporal => Some(ColumnClassification::Date),
        TypeFamily::Uuid => Some(ColumnClassification::Identifier),
        TypeFamily::Decimal => Some(ColumnClassification::Amount),
        _ => None,
    }
}

fn describe(words: &[String], class: ColumnClassification, role: KeyRole) -> String {
    let subject = words.join(" ");
    let meaning = match class {
        ColumnClassification::Identifier if role.primary_key => "primary identifier",
        ColumnClassification::Identifier if role.unique => "unique business code",
        ColumnClassification::Identifier => "identifier or code",
        ColumnClassification::Name => "display name",
        ColumnClassification::Description => "free-text description",
        ColumnClassification::Amount => "monetary amount or quantity",
        ColumnClassification::Date => "date or timestamp",
        ColumnClassification::Flag => "boolean flag",
        ColumnClassification::Reference => "reference to another record",
        ColumnClassification::Other => "business attribute",
    };
    format!("{}: {}", subject, meaning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::Vocabulary;

    fn classify(column: SourceColumn, role: KeyRole) -> Classification {
        let vocab = Vocabulary::standard();
        ColumnClassifier::new(&vocab.columns).classify(&column, role)
    }

    #[test]
    fn test_agreement_gives_high_confidence() {
        let c = classify(
            SourceColumn::new("CardCode", "nvarchar(15)").not_null(),
            KeyRole { unique: true, ..Default::default() },
        );
        assert_eq!(c.classification, ColumnClassification::Identifier);
        assert!(c.confidence >= 0.8);
        assert!(!c.manual_review);
        assert_eq!(c.suggested_field, "card_code");

        let c = classify(SourceColumn::new("CardName", "nvarchar(100)"), KeyRole::default());
        assert_eq!(c.classification, ColumnClassification::Name);
        assert!(c.confidence >= 0.8);
    }

    #[test]
    fn test_disagreement_flags_review() {
        let c = classify(SourceColumn::new("order_date", "varchar(8)"), KeyRole::default());
        assert_eq!(c.classification, ColumnClassification::Date);
        assert!(c.confidence <= 0.4);
        assert!(c.manual_review);
    }

    #[test]
    fn test_foreign_key_forces_reference() {
        let c = classify(
            SourceColumn::new("customer_id", "int"),
            KeyRole { foreign_key: true, ..Default::default() },
        );
        assert_eq!(c.classification, ColumnClassification::Reference);
        assert!(c.confidence >= 0.9);
    }

    #[test]
    fn test_flags() {
        let c = classify(SourceColumn::new("is_active", "bit"), KeyRole::default());
        assert_eq!(c.classification, ColumnClassification::Flag);
        let c = classify(
            SourceColumn::new("Frozen", "char(1)").with_max_length(1),
            KeyRole::default(),
        );
        assert_eq!(c.classification, ColumnClassification::Flag);
        assert!(!c.manual_review);
    }

    #[test]
    fn test_type_only_and_no_signal() {
        let c = classify(SourceColumn::new("x1", "datetime"), KeyRole::default());
        assert_eq!(c.classification, ColumnClassification::Date);
        assert_eq!(c.confidence, TYPE_ONLY);

        let c = classify(SourceColumn::new("f2", "varchar(20)"), KeyRole::default());
        assert_eq!(c.classification, ColumnClassification::Other);
        assert!(c.confidence < TYPE_ONLY);
    }

    #[test]
    fn test_amounts_and_descriptions() {
        let c = classify(SourceColumn::new("CreditLine", "numeric(19,6)"), KeyRole::default());
        assert_eq!(c.classification, ColumnClassification::Amount);
        let c = classify(SourceColumn::new("Balance", "numeric(19,6)"), KeyRole::default());
        assert_eq!(c.classification, ColumnClassification::Amount);
        let c = classify(SourceColumn::new("remarks", "text"), KeyRole::default());
        assert_eq!(c.classification, ColumnClassification::Description);
    }
}
