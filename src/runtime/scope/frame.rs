//! One scope's protected handles

use hashbrown::HashMap;

use super::element::Element;
use super::foreign::{Handle, SharedApi};

/// Handles stored without hashing before a frame spills into its map
pub const INLINE_SLOTS: usize = 4;

pub(crate) struct ScopeFrame {
    pub(crate) id: u64,
    pub(crate) api: SharedApi,
    slots: [Option<(Handle, Element)>; INLINE_SLOTS],
    overflow: Option<HashMap<Handle, Element>>,
    /// Whether the large scope warning was already logged
    pub(crate) warned: bool,
}

impl ScopeFrame {
    pub(crate) fn new(
        id: u64,
        api: SharedApi,
    ) -> Self {
        Self {
            id,
            api,
            slots: Default::default(),
            overflow: None,
            warned: false,
        }
    }

    pub(crate) fn find(
        &self,
        handle: Handle,
    ) -> Option<&Element> {
        self.slots
            .iter()
            .flatten()
            .find(|(h, _)| *h == handle)
            .map(|(_, e)| e)
            .or_else(|| self.overflow.as_ref()?.get(&handle))
    }

    /// Store a wrapper this frame owns
    pub(crate) fn insert(
        &mut self,
        handle: Handle,
        element: Element,
    ) {
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => *slot = Some((handle, element)),
            None => {
                self.overflow
                    .get_or_insert_with(HashMap::new)
                    .insert(handle, element);
            }
        }
    }

    pub(crate) fn owned_count(&self) -> usize {
        self.slots.iter().flatten().count() + self.overflow.as_ref().map_or(0, HashMap::len)
    }

    pub(crate) fn spilled(&self) -> bool {
        self.overflow.is_some()
    }

    /// Take every owned wrapper, inline slots first
    pub(crate) fn drain(&mut self) -> Vec<Element> {
        let mut owned: Vec<Element> = self
            .slots
            .iter_mut()
            .filter_map(|slot| slot.take().map(|(_, e)| e))
            .collect();
        if let Some(overflow) = self.overflow.take() {
            owned.extend(overflow.into_values());
        }
        owned
    }
}
