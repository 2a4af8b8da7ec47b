use ash::vk;

pub struct Queue {
    pub family_index: u32,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(
        family_index: u32,
        handle: vk::Queue,
    ) -> Self {
        Self {
            family_index,
            handle,
        }
    }
}

/// Queue families used for rendering and presentation. They may be the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Picks graphics and present families from `props`.
    ///
    /// A family that can do both wins. Otherwise the first graphics family is
    /// paired with the first family that can present.
    pub fn pick<F>(props: &[vk::QueueFamilyProperties], supports_present: F) -> Option<Self>
    where
        F: Fn(u32) -> bool,
    {
        let supports_graphics = |q: &vk::QueueFamilyProperties| {
            q.queue_count > 0 && q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        };

        if let Some(both) = props
            .iter()
            .enumerate()
            .position(|(i, q)| supports_graphics(q) && supports_present(i as u32))
        {
            return Some(Self {
                graphics: both as u32,
                present: both as u32,
            });
        }

        let graphics = props.iter().position(supports_graphics)? as u32;
        let present = (0..props.len() as u32)
            .find(|i| props[*i as usize].queue_count > 0 && supports_present(*i))?;

        Some(Self { graphics, present })
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}
