use crate::api::{Description, DescriptionId, ImageEntry, ImageId};

/// A point in image-space pixels. The wire format is integral, so rounding
/// happens once at the screen-to-image boundary and never here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImagePoint {
    pub x: i32,
    pub y: i32,
}

/// Normalized rectangle geometry: `x,y` is the top-left corner and
/// `width,height` are non-negative regardless of the drawing direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RectBounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl RectBounds {
    pub fn from_corners(a: ImagePoint, b: ImagePoint) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

/// Synchronization state of a finalized rectangle with the server store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Create request in flight; drawn but not yet acknowledged.
    Pending,
    /// Acknowledged by the server.
    Confirmed,
    /// Delete request in flight; removed only on acknowledgment.
    Deleting,
}

/// A finalized rectangle of the current image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rectangle {
    pub id: DescriptionId,
    pub bounds: RectBounds,
    pub sync: SyncState,
}

/// The in-progress rectangle between its two anchor clicks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Draft {
    pub id: DescriptionId,
    pub anchor: ImagePoint,
    pub cursor: ImagePoint,
}

impl Draft {
    pub fn bounds(&self) -> RectBounds {
        RectBounds::from_corners(self.anchor, self.cursor)
    }
}

/// Client-side state for the image currently being annotated.
///
/// Pointer events and server acknowledgments come in as plain method calls;
/// methods that require a server round-trip return the request parameters
/// for the caller to dispatch. The session itself never touches UI or IO.
#[derive(Default)]
pub struct Session {
    image_id: Option<ImageId>,
    rectangles: Vec<Rectangle>,
    draft: Option<Draft>,
    clearing: bool,
    drained: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image_id(&self) -> Option<ImageId> {
        self.image_id
    }

    pub fn rectangles(&self) -> &[Rectangle] {
        &self.rectangles
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    pub fn is_drafting(&self) -> bool {
        self.draft.is_some()
    }

    /// True once the image list held nothing left to describe.
    pub fn queue_drained(&self) -> bool {
        self.drained
    }

    /// Select the next image to describe: the smallest listed id strictly
    /// greater than the current one, or the smallest id overall when no
    /// image is shown yet. `None` means the queue is drained.
    pub fn pick_next(&self, images: &[ImageEntry]) -> Option<ImageId> {
        images
            .iter()
            .map(|entry| entry.id)
            .filter(|id| self.image_id.is_none_or(|current| *id > current))
            .min()
    }

    /// Switch to `id`, discarding every in-memory rectangle of the previous
    /// image.
    pub fn show_image(&mut self, id: ImageId) {
        self.image_id = Some(id);
        self.rectangles.clear();
        self.draft = None;
        self.clearing = false;
        self.drained = false;
    }

    /// Enter the terminal no-more-images state.
    pub fn drain(&mut self) {
        self.image_id = None;
        self.rectangles.clear();
        self.draft = None;
        self.clearing = false;
        self.drained = true;
    }

    /// Rebuild the rectangle list from the server's stored descriptions,
    /// all of them already confirmed.
    pub fn replay(&mut self, mut stored: Vec<Description>) {
        stored.sort_by_key(|description| description.id);
        self.rectangles = stored
            .iter()
            .map(|description| Rectangle {
                id: description.id,
                bounds: RectBounds {
                    x: description.x,
                    y: description.y,
                    width: description.width,
                    height: description.height,
                },
                sync: SyncState::Confirmed,
            })
            .collect();
        // A draft started before the stored list arrived keeps its geometry
        // but must not collide with a replayed id.
        let next_id = self.next_description_id();
        if let Some(draft) = &mut self.draft {
            draft.id = next_id;
        }
    }

    /// Canvas click toggle: start a draft, or finalize the active one.
    /// Returns the create request to issue when a draft was finalized.
    pub fn click(&mut self, at: ImagePoint) -> Option<(ImageId, Description)> {
        let image_id = self.image_id?;
        match self.draft.take() {
            Some(draft) => {
                let bounds = RectBounds::from_corners(draft.anchor, at);
                self.rectangles.push(Rectangle {
                    id: draft.id,
                    bounds,
                    sync: SyncState::Pending,
                });
                Some((
                    image_id,
                    Description {
                        id: draft.id,
                        x: bounds.x,
                        y: bounds.y,
                        width: bounds.width,
                        height: bounds.height,
                    },
                ))
            }
            None => {
                let id = self.next_description_id();
                self.draft = Some(Draft {
                    id,
                    anchor: at,
                    cursor: at,
                });
                None
            }
        }
    }

    /// Track the free corner of the draft. No-op outside a draft.
    pub fn pointer_moved(&mut self, at: ImagePoint) {
        if let Some(draft) = &mut self.draft {
            draft.cursor = at;
        }
    }

    /// The rectangle an undo would remove, if undo is currently possible.
    /// Guards against an empty canvas, a clear in flight, and a repeated
    /// undo while the previous one is still unacknowledged.
    pub fn undo_target(&self) -> Option<DescriptionId> {
        if self.clearing {
            return None;
        }
        match self.rectangles.last() {
            Some(rectangle) if rectangle.sync != SyncState::Deleting => Some(rectangle.id),
            _ => None,
        }
    }

    /// Mark the most recent rectangle as being deleted and return the delete
    /// request to issue. The rectangle stays visible until acknowledgment.
    pub fn begin_undo(&mut self) -> Option<(ImageId, DescriptionId)> {
        let image_id = self.image_id?;
        let id = self.undo_target()?;
        if let Some(rectangle) = self.rectangles.last_mut() {
            rectangle.sync = SyncState::Deleting;
        }
        Some((image_id, id))
    }

    pub fn can_clear(&self) -> bool {
        !self.rectangles.is_empty() && !self.clearing
    }

    /// Mark the whole rectangle set as being cleared and return the image to
    /// clear server-side. Rectangles stay visible until acknowledgment.
    pub fn begin_clear(&mut self) -> Option<ImageId> {
        if !self.can_clear() {
            return None;
        }
        let image_id = self.image_id?;
        self.clearing = true;
        Some(image_id)
    }

    /// Return the image to mark as described, discarding any draft.
    pub fn begin_save(&mut self) -> Option<ImageId> {
        self.draft = None;
        self.image_id
    }

    pub fn confirm_created(&mut self, id: DescriptionId) {
        if let Some(rectangle) = self.rectangle_mut(id) {
            if rectangle.sync == SyncState::Pending {
                rectangle.sync = SyncState::Confirmed;
            }
        }
    }

    pub fn confirm_deleted(&mut self, id: DescriptionId) {
        self.rectangles.retain(|rectangle| rectangle.id != id);
    }

    /// A delete request failed; make the rectangle undoable again.
    pub fn delete_failed(&mut self, id: DescriptionId) {
        if let Some(rectangle) = self.rectangle_mut(id) {
            if rectangle.sync == SyncState::Deleting {
                rectangle.sync = SyncState::Confirmed;
            }
        }
    }

    pub fn confirm_cleared(&mut self) {
        self.rectangles.clear();
        self.clearing = false;
    }

    pub fn clear_failed(&mut self) {
        self.clearing = false;
    }

    /// One past the highest live id, which equals the live rectangle count
    /// unless a delete is still in flight.
    fn next_description_id(&self) -> DescriptionId {
        self.rectangles
            .iter()
            .map(|rectangle| rectangle.id)
            .max()
            .map_or(0, |highest| highest + 1)
    }

    fn rectangle_mut(&mut self, id: DescriptionId) -> Option<&mut Rectangle> {
        self.rectangles
            .iter_mut()
            .find(|rectangle| rectangle.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: i32, y: i32) -> ImagePoint {
        ImagePoint { x, y }
    }

    fn session_on_image(id: ImageId) -> Session {
        let mut session = Session::new();
        session.show_image(id);
        session
    }

    /// Draw one rectangle through the click toggle and return its create
    /// request.
    fn draw(session: &mut Session, from: ImagePoint, to: ImagePoint) -> (ImageId, Description) {
        assert!(session.click(from).is_none(), "first click starts a draft");
        session.pointer_moved(to);
        session.click(to).expect("second click finalizes the draft")
    }

    #[test]
    fn corners_normalize_to_nonnegative_size() {
        let cases = [
            (point(0, 0), point(10, 20)),
            (point(10, 20), point(0, 0)),
            (point(10, 0), point(0, 20)),
            (point(5, 5), point(5, 5)),
        ];
        for (a, b) in cases {
            let bounds = RectBounds::from_corners(a, b);
            assert_eq!(bounds.x, a.x.min(b.x));
            assert_eq!(bounds.y, a.y.min(b.y));
            assert_eq!(bounds.width, (b.x - a.x).abs());
            assert_eq!(bounds.height, (b.y - a.y).abs());
            assert!(bounds.width >= 0 && bounds.height >= 0);
        }
    }

    #[test]
    fn draft_tracks_pointer() {
        let mut session = session_on_image(7);
        session.click(point(10, 10));
        session.pointer_moved(point(30, 5));
        let draft = session.draft().unwrap();
        assert_eq!(
            draft.bounds(),
            RectBounds {
                x: 10,
                y: 5,
                width: 20,
                height: 5
            }
        );
    }

    #[test]
    fn ids_are_ordinal_from_zero() {
        let mut session = session_on_image(7);
        for expected in 0..3 {
            let (_, description) = draw(
                &mut session,
                point(expected as i32 * 10, 0),
                point(expected as i32 * 10 + 5, 5),
            );
            assert_eq!(description.id, expected);
        }
        let ids: Vec<_> = session.rectangles().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn undo_frees_the_last_ordinal() {
        let mut session = session_on_image(7);
        draw(&mut session, point(0, 0), point(5, 5));
        draw(&mut session, point(10, 0), point(15, 5));

        let (_, id) = session.begin_undo().unwrap();
        assert_eq!(id, 1);
        session.confirm_deleted(id);

        let (_, description) = draw(&mut session, point(20, 0), point(25, 5));
        assert_eq!(description.id, 1);
    }

    #[test]
    fn end_to_end_draw_confirm_undo() {
        let mut session = session_on_image(7);

        let (image_id, description) = draw(&mut session, point(100, 100), point(150, 180));
        assert_eq!(image_id, 7);
        assert_eq!(
            description,
            Description {
                id: 0,
                x: 100,
                y: 100,
                width: 50,
                height: 80
            }
        );
        assert_eq!(session.rectangles()[0].sync, SyncState::Pending);

        session.confirm_created(0);
        assert_eq!(session.rectangles()[0].sync, SyncState::Confirmed);

        let (image_id, id) = session.begin_undo().unwrap();
        assert_eq!((image_id, id), (7, 0));
        assert_eq!(session.rectangles()[0].sync, SyncState::Deleting);

        session.confirm_deleted(0);
        assert!(session.rectangles().is_empty());
    }

    #[test]
    fn undo_on_empty_canvas_is_a_noop() {
        let mut session = session_on_image(7);
        assert_eq!(session.undo_target(), None);
        assert_eq!(session.begin_undo(), None);
    }

    #[test]
    fn undo_waits_for_the_inflight_delete() {
        let mut session = session_on_image(7);
        draw(&mut session, point(0, 0), point(5, 5));

        assert!(session.begin_undo().is_some());
        assert_eq!(session.begin_undo(), None);

        // The failed delete makes the rectangle undoable again.
        session.delete_failed(0);
        assert_eq!(session.undo_target(), Some(0));
    }

    #[test]
    fn clear_removes_every_rectangle_and_keeps_the_image() {
        let mut session = session_on_image(7);
        draw(&mut session, point(0, 0), point(5, 5));
        draw(&mut session, point(10, 0), point(15, 5));

        assert_eq!(session.begin_clear(), Some(7));
        assert!(!session.can_clear(), "clear already in flight");
        assert_eq!(session.rectangles().len(), 2, "nothing removed before ack");

        session.confirm_cleared();
        assert!(session.rectangles().is_empty());
        assert_eq!(session.image_id(), Some(7));
    }

    #[test]
    fn clear_failure_reenables_clearing() {
        let mut session = session_on_image(7);
        draw(&mut session, point(0, 0), point(5, 5));
        session.begin_clear();
        session.clear_failed();
        assert!(session.can_clear());
        assert_eq!(session.rectangles().len(), 1);
    }

    #[test]
    fn pick_next_takes_the_smallest_greater_id() {
        let images: Vec<ImageEntry> = [3, 5, 1].iter().map(|&id| ImageEntry { id }).collect();

        let mut session = Session::new();
        assert_eq!(session.pick_next(&images), Some(1));

        session.show_image(3);
        assert_eq!(session.pick_next(&images), Some(5));

        session.show_image(5);
        assert_eq!(session.pick_next(&images), None);

        assert_eq!(session.pick_next(&[]), None);
    }

    #[test]
    fn replay_reconstructs_confirmed_rectangles() {
        let mut session = session_on_image(7);
        session.replay(vec![Description {
            id: 0,
            x: 10,
            y: 10,
            width: 20,
            height: 30,
        }]);

        let rectangles = session.rectangles();
        assert_eq!(rectangles.len(), 1);
        assert_eq!(rectangles[0].sync, SyncState::Confirmed);
        assert_eq!(rectangles[0].bounds.x, 10);
        assert_eq!(rectangles[0].bounds.y, 10);
        assert_eq!(rectangles[0].bounds.right(), 30);
        assert_eq!(rectangles[0].bounds.bottom(), 40);
    }

    #[test]
    fn replay_tolerates_an_empty_list_and_unsorted_input() {
        let mut session = session_on_image(7);
        session.replay(Vec::new());
        assert!(session.rectangles().is_empty());

        let stored = [1, 0]
            .iter()
            .map(|&id| Description {
                id,
                x: id as i32,
                y: 0,
                width: 1,
                height: 1,
            })
            .collect();
        session.replay(stored);
        let ids: Vec<_> = session.rectangles().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn replay_rescues_a_colliding_draft_id() {
        let mut session = session_on_image(7);
        session.click(point(0, 0));
        session.replay(vec![Description {
            id: 0,
            x: 10,
            y: 10,
            width: 5,
            height: 5,
        }]);
        assert_eq!(session.draft().unwrap().id, 1);
    }

    #[test]
    fn switching_images_discards_rectangle_state() {
        let mut session = session_on_image(7);
        draw(&mut session, point(0, 0), point(5, 5));
        session.click(point(20, 20));

        session.show_image(9);
        assert_eq!(session.image_id(), Some(9));
        assert!(session.rectangles().is_empty());
        assert!(!session.is_drafting());
    }

    #[test]
    fn save_discards_the_draft() {
        let mut session = session_on_image(7);
        session.click(point(0, 0));
        assert_eq!(session.begin_save(), Some(7));
        assert!(!session.is_drafting());
    }

    #[test]
    fn clicks_without_an_image_do_nothing() {
        let mut session = Session::new();
        assert_eq!(session.click(point(0, 0)), None);
        assert!(!session.is_drafting());
    }

    #[test]
    fn drained_queue_resets_on_the_next_image() {
        let mut session = session_on_image(7);
        session.drain();
        assert!(session.queue_drained());
        assert_eq!(session.image_id(), None);

        session.show_image(8);
        assert!(!session.queue_drained());
    }
}
