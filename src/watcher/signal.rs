//! Re-evaluation signals and their relevance rules

use crate::dom::{Dom, IntersectionEntry, MutationKind, MutationRecord, WindowEvent};

/// Something that may have moved, hidden or replaced the tracked element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Window(WindowEvent),
    /// At least one relevant mutation record in the drained batch
    Mutations,
    Intersection(IntersectionEntry),
    Sweep,
}

/// How soon a signal should lead to a re-evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    /// Trailing debounce window
    Debounced,
    /// Debounce window stretched by the navigation settle delay
    Navigation,
    /// Handled in the same turn
    Immediate,
}

impl Signal {
    pub fn urgency(&self) -> Urgency {
        match self {
            Signal::Window(WindowEvent::Scroll | WindowEvent::Resize) | Signal::Mutations => Urgency::Debounced,
            Signal::Window(_) => Urgency::Navigation,
            Signal::Intersection(_) | Signal::Sweep => Urgency::Immediate,
        }
    }
}

/// Child-list changes anywhere count. Attribute changes count only when the
/// attribute is watched and the target is the resolved element or one of its
/// ancestors. Text changes count only inside the resolved element, since they
/// can flip text verification.
pub fn is_relevant_mutation<D: Dom + ?Sized>(
    dom: &D,
    record: &MutationRecord<D::Node>,
    resolved: Option<&D::Node>,
    watched_attributes: &[String],
) -> bool {
    match &record.kind {
        MutationKind::ChildList => true,
        MutationKind::Attributes { name } => {
            watched_attributes.iter().any(|w| w == name)
                && resolved.is_some_and(|el| dom.contains(&record.target, el))
        }
        MutationKind::CharacterData => resolved.is_some_and(|el| dom.contains(el, &record.target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;

    fn watched() -> Vec<String> {
        vec!["class".into(), "style".into(), "hidden".into()]
    }

    #[test]
    fn test_urgency() {
        assert_eq!(Signal::Window(WindowEvent::Scroll).urgency(), Urgency::Debounced);
        assert_eq!(Signal::Window(WindowEvent::Resize).urgency(), Urgency::Debounced);
        assert_eq!(Signal::Mutations.urgency(), Urgency::Debounced);
        assert_eq!(Signal::Window(WindowEvent::PushState).urgency(), Urgency::Navigation);
        assert_eq!(Signal::Window(WindowEvent::HashChange).urgency(), Urgency::Navigation);
        assert_eq!(Signal::Sweep.urgency(), Urgency::Immediate);
    }

    #[test]
    fn test_child_list_is_always_relevant() {
        let mut dom = MemoryDom::new();
        let body = dom.body_id();
        let other = dom.element(body, "div", &[], "");
        let record = MutationRecord {
            kind: MutationKind::ChildList,
            target: other,
        };
        assert!(is_relevant_mutation(&dom, &record, None, &watched()));
    }

    #[test]
    fn test_attribute_relevance_follows_ancestry() {
        let mut dom = MemoryDom::new();
        let body = dom.body_id();
        let wrapper = dom.element(body, "section", &[], "");
        let target = dom.element(wrapper, "p", &[], "x");
        let unrelated = dom.element(body, "aside", &[], "");

        let on = |node, name: &str| MutationRecord {
            kind: MutationKind::Attributes { name: name.into() },
            target: node,
        };
        let w = watched();
        assert!(is_relevant_mutation(&dom, &on(target, "class"), Some(&target), &w));
        assert!(is_relevant_mutation(&dom, &on(wrapper, "hidden"), Some(&target), &w));
        assert!(!is_relevant_mutation(&dom, &on(unrelated, "class"), Some(&target), &w));
        assert!(!is_relevant_mutation(&dom, &on(target, "data-x"), Some(&target), &w));
        assert!(!is_relevant_mutation(&dom, &on(target, "class"), None, &w));
    }

    #[test]
    fn test_text_change_inside_resolved_element() {
        let mut dom = MemoryDom::new();
        let body = dom.body_id();
        let target = dom.element(body, "p", &[], "");
        let inner = dom.element(target, "span", &[], "x");
        let record = MutationRecord {
            kind: MutationKind::CharacterData,
            target: inner,
        };
        let elsewhere = dom.element(body, "p", &[], "y");
        assert!(is_relevant_mutation(&dom, &record, Some(&target), &[]));
        assert!(!is_relevant_mutation(&dom, &record, Some(&elsewhere), &[]));
    }
}
