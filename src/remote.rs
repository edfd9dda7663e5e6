use std::sync::mpsc::{self, Receiver, Sender};

use crate::api::{ApiError, Description, DescriptionId, ImageEntry, ImageId};

/// Completion of one background API call. Events that concern a specific
/// image carry its id so the UI can drop completions that arrive after the
/// session has moved on.
pub enum ServerEvent {
    ImagesListed(Result<Vec<ImageEntry>, ApiError>),
    ImageFetched {
        image_id: ImageId,
        result: Result<image::DynamicImage, ApiError>,
    },
    DescriptionsFetched {
        image_id: ImageId,
        result: Result<Vec<Description>, ApiError>,
    },
    DescriptionCreated {
        image_id: ImageId,
        description_id: DescriptionId,
        result: Result<(), ApiError>,
    },
    DescriptionDeleted {
        image_id: ImageId,
        description_id: DescriptionId,
        result: Result<(), ApiError>,
    },
    DescriptionsCleared {
        image_id: ImageId,
        result: Result<(), ApiError>,
    },
    ImageMarkedDone {
        image_id: ImageId,
        result: Result<(), ApiError>,
    },
}

/// Runs API calls on short-lived worker threads and funnels their
/// completions back to the UI thread. Each call produces exactly one event;
/// independent calls complete in no particular order.
pub struct Remote {
    tx: Sender<ServerEvent>,
    rx: Receiver<ServerEvent>,
}

impl Remote {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    /// Run `job` on a worker thread and deliver its completion event,
    /// waking the UI so the event is reconciled on the next frame.
    pub fn spawn<F>(&self, ctx: &egui::Context, job: F)
    where
        F: FnOnce() -> ServerEvent + Send + 'static,
    {
        let tx = self.tx.clone();
        let ctx = ctx.clone();
        std::thread::spawn(move || {
            let event = job();
            if tx.send(event).is_ok() {
                ctx.request_repaint();
            }
        });
    }

    /// Next pending completion, if any. Drained once per frame.
    pub fn try_recv(&self) -> Option<ServerEvent> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn spawned_jobs_deliver_their_event() {
        let remote = Remote::new();
        let ctx = egui::Context::default();
        remote.spawn(&ctx, || ServerEvent::ImagesListed(Ok(vec![ImageEntry { id: 4 }])));

        let event = remote
            .rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should post its completion");
        match event {
            ServerEvent::ImagesListed(Ok(images)) => {
                assert_eq!(images, vec![ImageEntry { id: 4 }]);
            }
            _ => panic!("unexpected event"),
        }
    }

    #[test]
    fn try_recv_is_empty_without_completions() {
        let remote = Remote::new();
        assert!(remote.try_recv().is_none());
    }
}
