use crate::models::ModelElement;

/// A parsed model file.
///
/// `elements()` may be called more than once; each call restarts the
/// sequence from the beginning.
pub trait ModelResource: Send + Sync {
    fn elements(&self) -> Box<dyn Iterator<Item = ModelElement> + '_>;

    fn size_hint(&self) -> Option<usize> {
        None
    }
}

/// Resource backed by an in-memory list of elements.
#[derive(Debug, Clone, Default)]
pub struct ParsedResource {
    elements: Vec<ModelElement>,
}

impl ParsedResource {
    pub fn new(elements: Vec<ModelElement>) -> Self {
        Self { elements }
    }

    pub fn push(&mut self, element: ModelElement) {
        self.elements.push(element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl FromIterator<ModelElement> for ParsedResource {
    fn from_iter<I: IntoIterator<Item = ModelElement>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl ModelResource for ParsedResource {
    fn elements(&self) -> Box<dyn Iterator<Item = ModelElement> + '_> {
        Box::new(self.elements.iter().cloned())
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.elements.len())
    }
}
