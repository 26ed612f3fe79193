//! Two-axis clip launcher view with optional rotation

use super::{ScrollableWindow, TracksView};
use crate::control::{Control, ControlSet};
use crate::error::{ensure_in_range, Result, SurfaceError};
use crate::reactive::{Observable, ReadOnly, Subscription};
use crate::value::{ControlValue, ValueSet};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, warn};

pub const MAX_SCENES: usize = 64;

/// Which axis runs down the rows of the physical grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Rows are scenes, columns are tracks
    TracksByScenes,
    /// Rows are tracks, columns are scenes
    ScenesByTracks,
}

impl Orientation {
    pub fn rotated(self) -> Self {
        match self {
            Orientation::TracksByScenes => Orientation::ScenesByTracks,
            Orientation::ScenesByTracks => Orientation::TracksByScenes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Stopped,
    Playing,
    Recording,
}

/// One clip slot of the launcher grid
pub struct LauncherSlot {
    name: String,
    track: usize,
    scene: usize,
    has_content: Observable<bool>,
    state: Observable<SlotState>,
    queued: Observable<bool>,
}

impl LauncherSlot {
    fn new(track: usize, scene: usize) -> Self {
        Self {
            name: format!("Slot[t{},s{}]", track, scene),
            track,
            scene,
            has_content: Observable::new(false),
            state: Observable::new(SlotState::Stopped),
            queued: Observable::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn track(&self) -> usize {
        self.track
    }

    pub fn scene(&self) -> usize {
        self.scene
    }

    pub fn has_content(&self) -> &Observable<bool> {
        &self.has_content
    }

    pub fn state(&self) -> &Observable<SlotState> {
        &self.state
    }

    pub fn queued(&self) -> &Observable<bool> {
        &self.queued
    }

    /// Apply playback flags as reported by the application
    pub fn update_play_state_by_flags(&self, is_stop: bool, is_play: bool, is_record: bool, is_queued: bool) {
        let state = if is_record {
            SlotState::Recording
        } else if is_play {
            SlotState::Playing
        } else {
            if !is_stop {
                debug!("{}: no state flag set, assuming stopped", self.name);
            }
            SlotState::Stopped
        };
        self.state.set(state);
        self.queued.set(is_queued);
    }
}

impl fmt::Debug for LauncherSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LauncherSlot")
            .field("track", &self.track)
            .field("scene", &self.scene)
            .field("has_content", &self.has_content.get())
            .field("state", &self.state.get())
            .finish()
    }
}

struct SlotValueSets {
    tracks_by_scenes: Rc<ValueSet>,
    /// Transposed view on the same entries; only for square grids
    scenes_by_tracks: Option<Rc<ValueSet>>,
}

/// Tracks view plus a scene axis over a grid of launcher slots
pub struct MatrixView {
    tracks: TracksView,
    scenes: ScrollableWindow,
    num_scenes: usize,
    orientation: Observable<Orientation>,
    /// Indexed `scene * num_tracks + track`
    slots: Vec<Rc<LauncherSlot>>,
    slot_value_sets: RefCell<Option<SlotValueSets>>,
    can_move_matrix_up: Observable<bool>,
    can_move_matrix_down: Observable<bool>,
    can_move_matrix_left: Observable<bool>,
    can_move_matrix_right: Observable<bool>,
}

fn axis_computed(
    orientation: &Observable<Orientation>,
    when_tracks_by_scenes: ReadOnly<bool>,
    otherwise: ReadOnly<bool>,
) -> Observable<bool> {
    let o = orientation.clone();
    let (a, b) = (when_tracks_by_scenes.clone(), otherwise.clone());
    Observable::computed(&[orientation, &when_tracks_by_scenes, &otherwise], move || {
        match o.get() {
            Orientation::TracksByScenes => a.get(),
            Orientation::ScenesByTracks => b.get(),
        }
    })
}

impl MatrixView {
    pub fn new(
        name: impl Into<String>,
        num_tracks: usize,
        num_sends: usize,
        num_scenes: usize,
    ) -> Result<Self> {
        let name = name.into();
        ensure_in_range(num_scenes, 2, MAX_SCENES, "scenes")?;
        let tracks = TracksView::new(name.clone(), num_tracks, num_sends)?;
        let scenes = ScrollableWindow::new(format!("{}-scenes", name), num_scenes)?;

        let slots = (0..num_scenes)
            .flat_map(|scene| (0..num_tracks).map(move |track| (track, scene)))
            .map(|(track, scene)| Rc::new(LauncherSlot::new(track, scene)))
            .collect();

        let orientation = Observable::new(Orientation::TracksByScenes);
        let channels = tracks.channels();
        let can_move_matrix_up =
            axis_computed(&orientation, scenes.can_move_back(), channels.can_move_back());
        let can_move_matrix_down =
            axis_computed(&orientation, scenes.can_move_forth(), channels.can_move_forth());
        let can_move_matrix_left =
            axis_computed(&orientation, channels.can_move_back(), scenes.can_move_back());
        let can_move_matrix_right =
            axis_computed(&orientation, channels.can_move_forth(), scenes.can_move_forth());

        Ok(Self {
            tracks,
            scenes,
            num_scenes,
            orientation,
            slots,
            slot_value_sets: RefCell::new(None),
            can_move_matrix_up,
            can_move_matrix_down,
            can_move_matrix_left,
            can_move_matrix_right,
        })
    }

    pub fn name(&self) -> &str {
        self.tracks.name()
    }

    pub fn tracks(&self) -> &TracksView {
        &self.tracks
    }

    pub fn scenes(&self) -> &ScrollableWindow {
        &self.scenes
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.num_tracks()
    }

    pub fn num_scenes(&self) -> usize {
        self.num_scenes
    }

    pub fn set_total_scenes(&self, total: usize) {
        self.scenes.set_total_items(total);
    }

    pub fn can_move_scene_back(&self) -> ReadOnly<bool> {
        self.scenes.can_move_back()
    }

    pub fn can_move_scene_forth(&self) -> ReadOnly<bool> {
        self.scenes.can_move_forth()
    }

    pub fn move_scene_back(&self) -> bool {
        self.scenes.move_back()
    }

    pub fn move_scene_forth(&self) -> bool {
        self.scenes.move_forth()
    }

    pub fn move_scene_page_back(&self) -> bool {
        self.scenes.move_page_back()
    }

    pub fn move_scene_page_forth(&self) -> bool {
        self.scenes.move_page_forth()
    }

    /// Rotation needs as many tracks as scenes
    pub fn can_rotate(&self) -> bool {
        self.num_tracks() == self.num_scenes
    }

    pub fn orientation(&self) -> ReadOnly<Orientation> {
        self.orientation.read_only()
    }

    pub fn set_orientation(&self, orientation: Orientation) -> Result<()> {
        if orientation == self.orientation.get() {
            return Ok(());
        }
        if !self.can_rotate() {
            return Err(SurfaceError::NotRotatable(self.name().to_string()));
        }
        self.orientation.set(orientation);
        info!(
            "{} axis: {}",
            self.name(),
            match orientation {
                Orientation::TracksByScenes => "rows = scenes, columns = tracks",
                Orientation::ScenesByTracks => "rows = tracks, columns = scenes",
            }
        );
        Ok(())
    }

    pub fn rotate(&self) -> Result<()> {
        self.set_orientation(self.orientation.get().rotated())
    }

    fn is_tracks_by_scenes(&self) -> bool {
        self.orientation.get() == Orientation::TracksByScenes
    }

    pub fn can_move_matrix_up(&self) -> ReadOnly<bool> {
        self.can_move_matrix_up.read_only()
    }

    pub fn can_move_matrix_down(&self) -> ReadOnly<bool> {
        self.can_move_matrix_down.read_only()
    }

    pub fn can_move_matrix_left(&self) -> ReadOnly<bool> {
        self.can_move_matrix_left.read_only()
    }

    pub fn can_move_matrix_right(&self) -> ReadOnly<bool> {
        self.can_move_matrix_right.read_only()
    }

    pub fn move_matrix_up(&self, one_page: bool) -> bool {
        match (self.is_tracks_by_scenes(), one_page) {
            (true, true) => self.move_scene_page_back(),
            (true, false) => self.move_scene_back(),
            (false, true) => self.tracks.move_channel_page_back(),
            (false, false) => self.tracks.move_channel_back(),
        }
    }

    pub fn move_matrix_down(&self, one_page: bool) -> bool {
        match (self.is_tracks_by_scenes(), one_page) {
            (true, true) => self.move_scene_page_forth(),
            (true, false) => self.move_scene_forth(),
            (false, true) => self.tracks.move_channel_page_forth(),
            (false, false) => self.tracks.move_channel_forth(),
        }
    }

    pub fn move_matrix_left(&self, one_page: bool) -> bool {
        match (self.is_tracks_by_scenes(), one_page) {
            (true, true) => self.tracks.move_channel_page_back(),
            (true, false) => self.tracks.move_channel_back(),
            (false, true) => self.move_scene_page_back(),
            (false, false) => self.move_scene_back(),
        }
    }

    pub fn move_matrix_right(&self, one_page: bool) -> bool {
        match (self.is_tracks_by_scenes(), one_page) {
            (true, true) => self.tracks.move_channel_page_forth(),
            (true, false) => self.tracks.move_channel_forth(),
            (false, true) => self.move_scene_page_forth(),
            (false, false) => self.move_scene_forth(),
        }
    }

    pub fn slot(&self, track: usize, scene: usize) -> Option<&Rc<LauncherSlot>> {
        if track >= self.num_tracks() {
            return None;
        }
        self.slots.get(scene * self.num_tracks() + track)
    }

    pub fn slots(&self) -> &[Rc<LauncherSlot>] {
        &self.slots
    }

    /// Has-content observer entry point for the application's slot bank
    pub fn set_slot_has_content(&self, track: usize, scene: usize, has_content: bool) {
        if let Some(slot) = self.slot(track, scene) {
            slot.has_content.set(has_content);
        }
    }

    /// Playback observer entry point; `state` is 0 stopped, 1 playing, 2 recording
    pub fn set_slot_playback_state(&self, track: usize, scene: usize, state: u8, queued: bool) {
        if let Some(slot) = self.slot(track, scene) {
            slot.update_play_state_by_flags(state == 0, state == 1, state == 2, queued);
        }
    }

    /// Create the value set(s) over all launcher slots
    ///
    /// For a square grid a second, transposed set is created that shares
    /// the first set's entries; rotating switches between the two without
    /// creating new values.
    pub fn prepare_launcher_slot_value_sets(
        &self,
        mut factory: impl FnMut(&Rc<LauncherSlot>) -> Option<Rc<dyn ControlValue>> + 'static,
    ) -> Result<()> {
        if self.slot_value_sets.borrow().is_some() {
            return Err(SurfaceError::config(format!(
                "launcher slot value sets of '{}' already prepared",
                self.name()
            )));
        }

        let num_tracks = self.num_tracks();
        let slots = self.slots.clone();
        let tracks_by_scenes = ValueSet::create_for_matrix(
            "LauncherSlotValues(TbS)",
            self.num_scenes,
            num_tracks,
            move |scene, track| factory(&slots[scene * num_tracks + track]),
        )?;
        debug!("Prepared value set {}", tracks_by_scenes.name());

        let scenes_by_tracks = if self.can_rotate() {
            let source = Rc::clone(&tracks_by_scenes);
            let transposed = ValueSet::create_for_matrix(
                "LauncherSlotValues(SbT)",
                num_tracks,
                self.num_scenes,
                move |track, scene| source.entry(scene * num_tracks + track),
            )?;
            debug!("Prepared value set {}", transposed.name());
            Some(transposed)
        } else {
            None
        };

        *self.slot_value_sets.borrow_mut() = Some(SlotValueSets {
            tracks_by_scenes,
            scenes_by_tracks,
        });
        Ok(())
    }

    /// Launcher slot value set for the current orientation
    pub fn launcher_slot_value_set(&self) -> Option<Rc<ValueSet>> {
        let sets = self.slot_value_sets.borrow();
        let Some(sets) = sets.as_ref() else {
            warn!("prepare_launcher_slot_value_sets() must be called before launcher_slot_value_set()");
            return None;
        };
        match self.orientation.get() {
            Orientation::TracksByScenes => Some(Rc::clone(&sets.tracks_by_scenes)),
            Orientation::ScenesByTracks => sets.scenes_by_tracks.clone(),
        }
    }

    /// Control set covering every launcher slot, built row by row
    ///
    /// `create` receives `(column, row, index)`.
    pub fn create_matrix_control_set(
        &self,
        mut create: impl FnMut(usize, usize, usize) -> Result<Rc<Control>>,
    ) -> Result<Rc<ControlSet>> {
        let num_tracks = self.num_tracks();
        ControlSet::build("Matrix", num_tracks * self.num_scenes, |index| {
            create(index % num_tracks, index / num_tracks, index)
        })
    }

    /// Attach the launcher slot values to `control_set` and re-attach on rotation
    pub fn attach_launcher_slots(&self, control_set: &Rc<ControlSet>) -> Result<Subscription> {
        let (tracks_by_scenes, scenes_by_tracks) = match self.slot_value_sets.borrow().as_ref() {
            Some(sets) => (
                Rc::clone(&sets.tracks_by_scenes),
                sets.scenes_by_tracks.clone(),
            ),
            None => {
                return Err(SurfaceError::config(format!(
                    "launcher slot value sets of '{}' not prepared",
                    self.name()
                )))
            }
        };

        if let Some(set) = self.launcher_slot_value_set() {
            control_set.attach(&set)?;
        }

        let weak_control_set = Rc::downgrade(control_set);
        Ok(self.orientation.subscribe(move |orientation| {
            let Some(control_set) = weak_control_set.upgrade() else {
                return;
            };
            let set = match orientation {
                Orientation::TracksByScenes => Some(&tracks_by_scenes),
                Orientation::ScenesByTracks => scenes_by_tracks.as_ref(),
            };
            if let Some(set) = set {
                if let Err(e) = control_set.attach(set) {
                    warn!("Cannot attach {}: {}", set.name(), e);
                }
            }
        }))
    }
}

impl fmt::Debug for MatrixView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatrixView")
            .field("name", &self.name())
            .field("tracks", &self.num_tracks())
            .field("scenes", &self.num_scenes)
            .field("orientation", &self.orientation.get())
            .finish()
    }
}
