// Queue family resolution
//
// Finds the first graphics-capable family and the first family able to
// present to a given surface. The two may coincide.

use super::error::{ContextError, Result};
use ash::vk;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Both indices, or `IncompleteQueueFamilies`
    pub fn resolve(&self) -> Result<ResolvedQueueFamilies> {
        match (self.graphics_family, self.present_family) {
            (Some(graphics), Some(present)) => Ok(ResolvedQueueFamilies { graphics, present }),
            (graphics, present) => Err(ContextError::IncompleteQueueFamilies { graphics, present }),
        }
    }
}

/// Queue family indices known to be complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedQueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl ResolvedQueueFamilies {
    /// Distinct family indices, graphics first. One entry when they coincide.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Scan `families` in order.
///
/// `supports_present` is asked about each family until a present family is
/// found; scanning stops as soon as both indices are known, so later
/// families are never queried.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;

        if indices.graphics_family.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics_family = Some(index);
        }
        if indices.present_family.is_none() && supports_present(index) {
            indices.present_family = Some(index);
        }
        if indices.is_complete() {
            break;
        }
    }

    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn shared_family() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = find_queue_families(&families, |_| true);
        assert!(indices.is_complete());
        assert_eq!(indices.graphics_family, indices.present_family);
        assert_eq!(indices.resolve().unwrap().unique(), vec![0]);
    }

    #[test]
    fn separate_families() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let indices = find_queue_families(&families, |i| i == 2);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(2));
        assert_eq!(indices.resolve().unwrap().unique(), vec![1, 2]);
    }

    #[test]
    fn first_match_wins() {
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let indices = find_queue_families(&families, |i| i >= 1);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn stops_querying_once_complete() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut asked = Vec::new();
        find_queue_families(&families, |i| {
            asked.push(i);
            true
        });
        assert_eq!(asked, vec![0]);
    }

    #[test]
    fn missing_present_is_incomplete_not_error() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = find_queue_families(&families, |_| false);
        assert_eq!(indices.graphics_family, Some(0));
        assert!(!indices.is_complete());
        assert!(matches!(
            indices.resolve(),
            Err(ContextError::IncompleteQueueFamilies { graphics: Some(0), present: None })
        ));
    }

    #[test]
    fn no_families() {
        let indices = find_queue_families(&[], |_| true);
        assert_eq!(indices, QueueFamilyIndices::default());
    }
}
