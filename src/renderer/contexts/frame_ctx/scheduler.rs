use std::time::Duration;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::target::SharedExtent;
use crate::renderer::contexts::frame_ctx::{FramePool, SlotSync};
use crate::renderer::error::ChainError;

/// Result of asking the presentation chain for the next backbuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presented {
    Optimal,
    Suboptimal,
    OutOfDate,
}

pub trait PresentChain {
    fn extent(&self) -> vk::Extent2D;
}

/// Device side of a frame: everything the scheduler needs from the GPU,
/// kept behind a trait so the loop itself can run without one.
pub trait FrameBackend {
    type Slot: SlotSync;
    type Chain: PresentChain;

    /// Builds a chain for `extent`, using `old` as the retirement hint.
    /// Must not return before all work submitted so far has retired.
    fn build_chain(
        &mut self,
        extent: vk::Extent2D,
        old: Option<&Self::Chain>,
    ) -> Result<Self::Chain, ChainError>;

    fn acquire(&mut self, chain: &Self::Chain, slot: &Self::Slot) -> Result<Acquired>;

    /// Records the whole frame into the slot's recording context
    fn record(&mut self, chain: &Self::Chain, slot: &Self::Slot, image_index: u32) -> Result<()>;

    fn submit(&mut self, slot: &Self::Slot) -> Result<()>;

    fn present(
        &mut self,
        chain: &Self::Chain,
        slot: &Self::Slot,
        image_index: u32,
    ) -> Result<Presented>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
    RecreatingChain,
}

/// Current scheduler state. Every transition is traced, and tests also get
/// the full history.
#[derive(Debug)]
struct StateTrace {
    current: SchedulerState,
    #[cfg(test)]
    history: Vec<SchedulerState>,
}

impl StateTrace {
    fn new() -> Self {
        Self {
            current: SchedulerState::Idle,
            #[cfg(test)]
            history: Vec::new(),
        }
    }

    fn enter(&mut self, state: SchedulerState) {
        log::trace!("Scheduler {:?} -> {:?}", self.current, state);
        self.current = state;
        #[cfg(test)]
        self.history.push(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was presented and the chain is still usable
    Presented,
    /// The chain was rebuilt during this call
    Recreated,
    /// The surface has no area, so the chain could not be rebuilt
    Suspended,
}

/// Drives acquire, record, submit and present over a ring of frame slots.
///
/// Fields drop in declaration order, so every slot and the chain are
/// released before the backend that owns the GPU resources they reference.
/// Whoever owns the scheduler must wait for the device to go idle first.
pub struct FrameScheduler<B: FrameBackend> {
    pool: FramePool<B::Slot>,
    chain: Option<B::Chain>,
    backend: B,

    live_extent: SharedExtent,
    frame_index: usize,
    state: StateTrace,
    rebuild_pending: bool,
    zero_extent_backoff: Duration,
}

impl<B: FrameBackend> FrameScheduler<B> {
    /// Takes ownership of the pool and builds the first chain. A minimized
    /// window at startup is not an error: the build is retried by the next
    /// [`FrameScheduler::draw_frame`].
    pub fn new(
        backend: B,
        pool: FramePool<B::Slot>,
        live_extent: SharedExtent,
        zero_extent_backoff: Duration,
    ) -> Result<Self> {
        let mut scheduler = Self {
            pool,
            chain: None,
            backend,

            live_extent,
            frame_index: 0,
            state: StateTrace::new(),
            rebuild_pending: true,
            zero_extent_backoff,
        };
        scheduler.recreate_chain()?;

        Ok(scheduler)
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn state(&self) -> SchedulerState {
        self.state.current
    }

    pub fn chain(&self) -> Option<&B::Chain> {
        self.chain.as_ref()
    }

    #[cfg(test)]
    fn backend(&self) -> &B {
        &self.backend
    }

    #[cfg(test)]
    fn take_state_history(&mut self) -> Vec<SchedulerState> {
        std::mem::take(&mut self.state.history)
    }

    pub fn draw_frame(&mut self) -> Result<FrameOutcome> {
        if self.rebuild_pending && !self.recreate_chain()? {
            return Ok(FrameOutcome::Suspended);
        }
        let Some(chain) = self.chain.as_ref() else {
            // A pending rebuild is only cleared once a chain exists
            return Ok(FrameOutcome::Suspended);
        };

        let i = self.frame_index;
        self.pool.wait(i)?;

        self.state.enter(SchedulerState::Acquiring);
        let (image_index, acquired_suboptimal) = match self.backend.acquire(chain, self.pool.slot(i))? {
            Acquired::Image { index, suboptimal } => (index, suboptimal),
            Acquired::OutOfDate => {
                // Nothing was recorded or submitted, so the slot's fence is
                // still signaled and the same slot is used next time
                log::debug!("Presentation chain out of date on acquire");
                return self.recreate_outcome();
            }
        };

        self.pool.reset_for_reuse(i)?;

        self.state.enter(SchedulerState::Recording);
        self.backend.record(chain, self.pool.slot(i), image_index)?;

        self.backend.submit(self.pool.slot(i))?;
        self.state.enter(SchedulerState::Submitted);

        self.state.enter(SchedulerState::Presenting);
        let presented = self.backend.present(chain, self.pool.slot(i), image_index)?;
        let live_extent = self.live_extent.get();
        let chain_extent = chain.extent();

        self.frame_index = (self.frame_index + 1) % self.pool.len();

        let stale = match presented {
            Presented::OutOfDate => Some("out of date on present"),
            Presented::Suboptimal => Some("suboptimal on present"),
            Presented::Optimal if acquired_suboptimal => Some("suboptimal on acquire"),
            Presented::Optimal if live_extent != chain_extent => Some("window extent changed"),
            Presented::Optimal => None,
        };
        match stale {
            Some(reason) => {
                log::debug!(
                    "Recreating presentation chain: {} (chain {}x{}, window {}x{})",
                    reason,
                    chain_extent.width,
                    chain_extent.height,
                    live_extent.width,
                    live_extent.height,
                );
                self.recreate_outcome()
            }
            None => {
                self.state.enter(SchedulerState::Idle);
                Ok(FrameOutcome::Presented)
            }
        }
    }

    /// Replaces the chain with one built for the current window extent.
    /// The old chain is released only after the new one exists.
    pub fn rebuild_chain(&mut self) -> Result<(), ChainError> {
        let extent = self.live_extent.get();
        let chain = self.backend.build_chain(extent, self.chain.as_ref())?;
        self.chain = Some(chain);
        Ok(())
    }

    fn recreate_outcome(&mut self) -> Result<FrameOutcome> {
        Ok(if self.recreate_chain()? {
            FrameOutcome::Recreated
        } else {
            FrameOutcome::Suspended
        })
    }

    /// Returns `false` if the surface has no area yet. The current chain, if
    /// any, is kept and the rebuild is retried on the next frame.
    fn recreate_chain(&mut self) -> Result<bool> {
        self.state.enter(SchedulerState::RecreatingChain);

        match self.rebuild_chain() {
            Ok(()) => {
                self.rebuild_pending = false;
                self.state.enter(SchedulerState::Idle);
                Ok(true)
            }
            Err(ChainError::ZeroExtent { width, height }) => {
                log::debug!(
                    "Surface extent is {}x{}, retrying in {:?}",
                    width,
                    height,
                    self.zero_extent_backoff,
                );
                self.rebuild_pending = true;
                self.state.enter(SchedulerState::Idle);
                if !self.zero_extent_backoff.is_zero() {
                    std::thread::sleep(self.zero_extent_backoff);
                }
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Build { extent: (u32, u32), had_old: bool },
        Acquire(usize),
        Reset(usize),
        Record { slot: usize, image: u32 },
        Submit(usize),
        Present { slot: usize, image: u32 },
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    /// Fence model: signaled until reset, signaled again by submit
    struct MockSlot {
        id: usize,
        signaled: Rc<Cell<bool>>,
        not_ready_polls: Cell<u32>,
        log: Log,
    }

    impl SlotSync for MockSlot {
        fn wait_fence(&self, _timeout_ns: u64) -> Result<bool> {
            if self.not_ready_polls.get() > 0 {
                self.not_ready_polls.set(self.not_ready_polls.get() - 1);
                return Ok(false);
            }
            assert!(self.signaled.get(), "slot {} waited on a fence nothing will signal", self.id);
            Ok(true)
        }

        fn reset(&mut self) -> Result<()> {
            assert!(self.signaled.get(), "slot {} reset while still in flight", self.id);
            self.signaled.set(false);
            self.log.borrow_mut().push(Event::Reset(self.id));
            Ok(())
        }
    }

    struct MockChain {
        extent: vk::Extent2D,
        generation: u32,
    }

    impl PresentChain for MockChain {
        fn extent(&self) -> vk::Extent2D {
            self.extent
        }
    }

    #[derive(Default)]
    struct MockBackend {
        log: Log,
        builds: u32,
        acquire_results: VecDeque<Acquired>,
        present_results: VecDeque<Presented>,
        next_image: u32,
        fences: Vec<Rc<Cell<bool>>>,
    }

    impl MockBackend {
        const IMAGE_COUNT: u32 = 3;
    }

    impl FrameBackend for MockBackend {
        type Slot = MockSlot;
        type Chain = MockChain;

        fn build_chain(
            &mut self,
            extent: vk::Extent2D,
            old: Option<&MockChain>,
        ) -> Result<MockChain, ChainError> {
            // Full device wait: everything in flight retires
            for fence in &self.fences {
                fence.set(true);
            }
            if extent.width == 0 || extent.height == 0 {
                return Err(ChainError::ZeroExtent { width: extent.width, height: extent.height });
            }
            self.builds += 1;
            self.log.borrow_mut().push(Event::Build {
                extent: (extent.width, extent.height),
                had_old: old.is_some(),
            });
            Ok(MockChain { extent, generation: self.builds })
        }

        fn acquire(&mut self, _chain: &MockChain, slot: &MockSlot) -> Result<Acquired> {
            self.log.borrow_mut().push(Event::Acquire(slot.id));
            let result = self.acquire_results.pop_front().unwrap_or(Acquired::Image {
                index: self.next_image,
                suboptimal: false,
            });
            if let Acquired::Image { .. } = result {
                self.next_image = (self.next_image + 1) % Self::IMAGE_COUNT;
            }
            Ok(result)
        }

        fn record(&mut self, _chain: &MockChain, slot: &MockSlot, image_index: u32) -> Result<()> {
            assert!(!slot.signaled.get(), "recording into slot {} without a reset", slot.id);
            self.log.borrow_mut().push(Event::Record { slot: slot.id, image: image_index });
            Ok(())
        }

        fn submit(&mut self, slot: &MockSlot) -> Result<()> {
            self.log.borrow_mut().push(Event::Submit(slot.id));
            // The device finishes instantly
            slot.signaled.set(true);
            Ok(())
        }

        fn present(&mut self, _chain: &MockChain, slot: &MockSlot, image_index: u32) -> Result<Presented> {
            self.log.borrow_mut().push(Event::Present { slot: slot.id, image: image_index });
            Ok(self.present_results.pop_front().unwrap_or(Presented::Optimal))
        }
    }

    fn scheduler_with(
        mut backend: MockBackend,
        n: usize,
        extent: &SharedExtent,
        not_ready_polls: u32,
    ) -> FrameScheduler<MockBackend> {
        let log = backend.log.clone();
        let mut fences = Vec::new();
        let pool = FramePool::new(n, |id| {
            let signaled = Rc::new(Cell::new(true));
            fences.push(signaled.clone());
            Ok(MockSlot {
                id,
                signaled,
                not_ready_polls: Cell::new(not_ready_polls),
                log: log.clone(),
            })
        })
        .unwrap();
        backend.fences = fences;
        FrameScheduler::new(backend, pool, extent.clone(), Duration::ZERO).unwrap()
    }

    fn events_since(scheduler: &FrameScheduler<MockBackend>, start: usize) -> Vec<Event> {
        scheduler.backend().log.borrow()[start..].to_vec()
    }

    fn log_len(scheduler: &FrameScheduler<MockBackend>) -> usize {
        scheduler.backend().log.borrow().len()
    }

    #[test]
    fn first_chain_is_built_on_construction() {
        let extent = SharedExtent::new(900, 600);
        let scheduler = scheduler_with(MockBackend::default(), 2, &extent, 0);
        assert_eq!(
            events_since(&scheduler, 0),
            vec![Event::Build { extent: (900, 600), had_old: false }],
        );
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.frame_index(), 0);
    }

    #[test]
    fn steady_state_cycles_frame_slots() {
        let extent = SharedExtent::new(900, 600);
        // Each slot's fence reports "not yet" on its first wait only
        let mut scheduler = scheduler_with(MockBackend::default(), 2, &extent, 1);

        for frame in 0..1000 {
            assert_eq!(scheduler.frame_index(), frame % 2);
            let start = log_len(&scheduler);
            let outcome = scheduler.draw_frame().unwrap();
            assert_eq!(outcome, FrameOutcome::Presented);

            let slot = frame % 2;
            let image = (frame % MockBackend::IMAGE_COUNT as usize) as u32;
            assert_eq!(
                events_since(&scheduler, start),
                vec![
                    Event::Acquire(slot),
                    Event::Reset(slot),
                    Event::Record { slot, image },
                    Event::Submit(slot),
                    Event::Present { slot, image },
                ],
            );
        }
        assert_eq!(scheduler.backend().builds, 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn presented_frame_walks_every_state_in_order() {
        use SchedulerState::*;
        let extent = SharedExtent::new(900, 600);
        let mut scheduler = scheduler_with(MockBackend::default(), 2, &extent, 0);
        scheduler.take_state_history();

        for _ in 0..3 {
            assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Presented);
            assert_eq!(
                scheduler.take_state_history(),
                vec![Acquiring, Recording, Submitted, Presenting, Idle],
            );
        }

        extent.set(1280, 720);
        assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Recreated);
        assert_eq!(
            scheduler.take_state_history(),
            vec![Acquiring, Recording, Submitted, Presenting, RecreatingChain, Idle],
        );
    }

    #[test]
    fn out_of_date_acquire_skips_the_frame_and_rebuilds() {
        let extent = SharedExtent::new(900, 600);
        let mut backend = MockBackend::default();
        backend.acquire_results = (0..4)
            .map(|index| Acquired::Image { index: index % 3, suboptimal: false })
            .chain([Acquired::OutOfDate])
            .collect();
        let mut scheduler = scheduler_with(backend, 2, &extent, 0);

        for _ in 0..4 {
            assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Presented);
        }
        let index_after_fourth = scheduler.frame_index();
        assert_eq!(index_after_fourth, 0);

        let start = log_len(&scheduler);
        assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Recreated);
        assert_eq!(
            events_since(&scheduler, start),
            vec![
                Event::Acquire(0),
                Event::Build { extent: (900, 600), had_old: true },
            ],
        );
        assert_eq!(scheduler.frame_index(), index_after_fourth);
        assert_eq!(scheduler.chain().unwrap().generation, 2);

        let start = log_len(&scheduler);
        assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Presented);
        let events = events_since(&scheduler, start);
        assert_eq!(events[0], Event::Acquire(0));
        assert!(events.contains(&Event::Submit(0)));
        assert_eq!(scheduler.frame_index(), 1);
    }

    #[test]
    fn minimized_window_suspends_until_restored() {
        let extent = SharedExtent::new(900, 600);
        let mut scheduler = scheduler_with(MockBackend::default(), 2, &extent, 0);
        assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Presented);

        extent.set(0, 0);
        assert!(matches!(
            scheduler.rebuild_chain(),
            Err(ChainError::ZeroExtent { width: 0, height: 0 }),
        ));

        // The extent mismatch is noticed after presenting, and the rebuild is deferred
        assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Suspended);
        assert_eq!(scheduler.chain().unwrap().extent(), vk::Extent2D { width: 900, height: 600 });
        for _ in 0..5 {
            assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Suspended);
        }

        extent.set(1280, 720);
        let start = log_len(&scheduler);
        assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Presented);
        assert_eq!(
            events_since(&scheduler, start)[0],
            Event::Build { extent: (1280, 720), had_old: true },
        );
        assert_eq!(scheduler.chain().unwrap().extent(), vk::Extent2D { width: 1280, height: 720 });
    }

    #[test]
    fn zero_extent_in_either_dimension_is_reported_as_such() {
        let extent = SharedExtent::new(900, 600);
        let mut scheduler = scheduler_with(MockBackend::default(), 2, &extent, 0);
        for (w, h) in [(0, 600), (900, 0), (0, 1), (1, 0)] {
            extent.set(w, h);
            match scheduler.rebuild_chain() {
                Err(ChainError::ZeroExtent { width, height }) => assert_eq!((width, height), (w, h)),
                other => panic!("expected zero extent for {w}x{h}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rebuilding_twice_uses_the_latest_extent() {
        let extent = SharedExtent::new(900, 600);
        let mut scheduler = scheduler_with(MockBackend::default(), 3, &extent, 0);

        extent.set(1024, 768);
        scheduler.rebuild_chain().unwrap();
        extent.set(640, 480);
        scheduler.rebuild_chain().unwrap();

        let chain = scheduler.chain().unwrap();
        assert_eq!(chain.extent(), vk::Extent2D { width: 640, height: 480 });
        assert_eq!(chain.generation, 3);
    }

    #[test]
    fn suboptimal_acquire_rebuilds_after_presenting() {
        let extent = SharedExtent::new(900, 600);
        let mut backend = MockBackend::default();
        backend.acquire_results.push_back(Acquired::Image { index: 2, suboptimal: true });
        let mut scheduler = scheduler_with(backend, 2, &extent, 0);

        let start = log_len(&scheduler);
        assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Recreated);
        assert_eq!(
            events_since(&scheduler, start),
            vec![
                Event::Acquire(0),
                Event::Reset(0),
                Event::Record { slot: 0, image: 2 },
                Event::Submit(0),
                Event::Present { slot: 0, image: 2 },
                Event::Build { extent: (900, 600), had_old: true },
            ],
        );
        assert_eq!(scheduler.frame_index(), 1);
    }

    #[test]
    fn present_results_and_resizes_trigger_rebuild() {
        let extent = SharedExtent::new(900, 600);
        let mut backend = MockBackend::default();
        backend.present_results = [Presented::Suboptimal, Presented::OutOfDate].into();
        let mut scheduler = scheduler_with(backend, 2, &extent, 0);

        assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Recreated);
        assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Recreated);
        assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Presented);

        extent.set(1280, 720);
        assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Recreated);
        assert_eq!(scheduler.chain().unwrap().extent(), vk::Extent2D { width: 1280, height: 720 });
        assert_eq!(scheduler.backend().builds, 4);
        assert_eq!(scheduler.frame_index(), 0);
    }

    #[test]
    fn single_slot_pool_waits_for_every_frame() {
        let extent = SharedExtent::new(900, 600);
        let mut scheduler = scheduler_with(MockBackend::default(), 1, &extent, 2);
        for _ in 0..10 {
            assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Presented);
            assert_eq!(scheduler.frame_index(), 0);
        }
    }

    #[test]
    fn minimized_at_startup_builds_on_first_restored_frame() {
        let extent = SharedExtent::new(0, 0);
        let mut scheduler = scheduler_with(MockBackend::default(), 2, &extent, 0);
        assert!(scheduler.chain().is_none());
        assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Suspended);

        extent.set(900, 600);
        assert_eq!(scheduler.draw_frame().unwrap(), FrameOutcome::Presented);
        assert_eq!(
            events_since(&scheduler, 0)[0],
            Event::Build { extent: (900, 600), had_old: false },
        );
    }
}
