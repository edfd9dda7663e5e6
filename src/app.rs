use std::sync::Arc;

use eframe::egui;

use crate::api::{ApiClient, Description, DescriptionId, ImageId};
use crate::remote::{Remote, ServerEvent};
use crate::session::{ImagePoint, RectBounds, Session, SyncState};

const PENDING_COLOR: egui::Color32 = egui::Color32::from_rgb(214, 64, 64);
const CONFIRMED_COLOR: egui::Color32 = egui::Color32::from_rgb(46, 160, 67);
const DELETING_COLOR: egui::Color32 = egui::Color32::from_rgb(140, 140, 140);

/// Destructive action awaiting user confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PendingConfirm {
    UndoLast,
    ClearAll,
}

pub struct AnnotateApp {
    api: Arc<ApiClient>,
    remote: Remote,
    session: Session,

    texture: Option<egui::TextureHandle>,
    image_size: (f32, f32),
    loading_image: bool,
    fetching_list: bool,

    confirm: Option<PendingConfirm>,
    status: Option<String>,

    // pan & zoom
    pan: egui::Vec2,
    zoom: f32,
}

impl AnnotateApp {
    pub fn new(ctx: &egui::Context, api: ApiClient) -> Self {
        let mut app = Self {
            api: Arc::new(api),
            remote: Remote::new(),
            session: Session::new(),
            texture: None,
            image_size: (0.0, 0.0),
            loading_image: false,
            fetching_list: false,
            confirm: None,
            status: None,
            pan: egui::Vec2::ZERO,
            zoom: 1.0,
        };
        app.request_image_list(ctx);
        app
    }

    // ── Outgoing requests ──────────────────────────────────────────────────

    fn request_image_list(&mut self, ctx: &egui::Context) {
        if self.fetching_list {
            return;
        }
        self.fetching_list = true;
        let api = Arc::clone(&self.api);
        self.remote
            .spawn(ctx, move || ServerEvent::ImagesListed(api.list_images()));
    }

    fn request_image(&mut self, ctx: &egui::Context, image_id: ImageId) {
        self.loading_image = true;
        let api = Arc::clone(&self.api);
        self.remote.spawn(ctx, move || ServerEvent::ImageFetched {
            image_id,
            result: api.fetch_image(image_id),
        });
    }

    fn request_descriptions(&self, ctx: &egui::Context, image_id: ImageId) {
        let api = Arc::clone(&self.api);
        self.remote
            .spawn(ctx, move || ServerEvent::DescriptionsFetched {
                image_id,
                result: api.list_descriptions(image_id),
            });
    }

    fn request_create(&self, ctx: &egui::Context, image_id: ImageId, description: Description) {
        let api = Arc::clone(&self.api);
        self.remote
            .spawn(ctx, move || ServerEvent::DescriptionCreated {
                image_id,
                description_id: description.id,
                result: api.create_description(image_id, &description),
            });
    }

    fn request_delete(&self, ctx: &egui::Context, image_id: ImageId, description_id: DescriptionId) {
        let api = Arc::clone(&self.api);
        self.remote
            .spawn(ctx, move || ServerEvent::DescriptionDeleted {
                image_id,
                description_id,
                result: api.delete_description(image_id, description_id),
            });
    }

    fn request_clear(&self, ctx: &egui::Context, image_id: ImageId) {
        let api = Arc::clone(&self.api);
        self.remote
            .spawn(ctx, move || ServerEvent::DescriptionsCleared {
                image_id,
                result: api.delete_all_descriptions(image_id),
            });
    }

    fn request_mark_done(&self, ctx: &egui::Context, image_id: ImageId) {
        let api = Arc::clone(&self.api);
        self.remote.spawn(ctx, move || ServerEvent::ImageMarkedDone {
            image_id,
            result: api.mark_described(image_id),
        });
    }

    // ── Incoming completions ───────────────────────────────────────────────

    fn process_server_events(&mut self, ctx: &egui::Context) {
        while let Some(event) = self.remote.try_recv() {
            match event {
                ServerEvent::ImagesListed(result) => {
                    self.fetching_list = false;
                    match result {
                        Ok(images) => match self.session.pick_next(&images) {
                            Some(next) => {
                                log::info!("showing image {next}");
                                self.session.show_image(next);
                                self.texture = None;
                                self.request_image(ctx, next);
                                self.request_descriptions(ctx, next);
                            }
                            None => {
                                log::info!("no images left to describe");
                                self.session.drain();
                                self.texture = None;
                            }
                        },
                        Err(err) => self.report_failure("listing images", &err),
                    }
                }
                ServerEvent::ImageFetched { image_id, result } => {
                    if self.session.image_id() != Some(image_id) {
                        continue; // stale: the session has moved on
                    }
                    self.loading_image = false;
                    match result {
                        Ok(img) => self.install_texture(ctx, &img),
                        Err(err) => {
                            self.report_failure(&format!("loading image {image_id}"), &err);
                        }
                    }
                }
                ServerEvent::DescriptionsFetched { image_id, result } => {
                    if self.session.image_id() != Some(image_id) {
                        continue;
                    }
                    match result {
                        Ok(stored) => self.session.replay(stored),
                        Err(err) => {
                            self.report_failure(
                                &format!("loading descriptions of image {image_id}"),
                                &err,
                            );
                        }
                    }
                }
                ServerEvent::DescriptionCreated {
                    image_id,
                    description_id,
                    result,
                } => {
                    if self.session.image_id() != Some(image_id) {
                        continue;
                    }
                    match result {
                        Ok(()) => self.session.confirm_created(description_id),
                        // A failed create leaves the rectangle pending, never
                        // confirmed.
                        Err(err) => {
                            self.report_failure(
                                &format!("saving description {description_id}"),
                                &err,
                            );
                        }
                    }
                }
                ServerEvent::DescriptionDeleted {
                    image_id,
                    description_id,
                    result,
                } => {
                    if self.session.image_id() != Some(image_id) {
                        continue;
                    }
                    match result {
                        Ok(()) => self.session.confirm_deleted(description_id),
                        Err(err) => {
                            self.session.delete_failed(description_id);
                            self.report_failure(
                                &format!("deleting description {description_id}"),
                                &err,
                            );
                        }
                    }
                }
                ServerEvent::DescriptionsCleared { image_id, result } => {
                    if self.session.image_id() != Some(image_id) {
                        continue;
                    }
                    match result {
                        Ok(()) => self.session.confirm_cleared(),
                        Err(err) => {
                            self.session.clear_failed();
                            self.report_failure("clearing descriptions", &err);
                        }
                    }
                }
                ServerEvent::ImageMarkedDone { image_id, result } => {
                    if self.session.image_id() != Some(image_id) {
                        continue;
                    }
                    match result {
                        Ok(()) => self.request_image_list(ctx),
                        Err(err) => {
                            self.report_failure(&format!("marking image {image_id} done"), &err);
                        }
                    }
                }
            }
        }
    }

    fn report_failure(&mut self, what: &str, err: &crate::api::ApiError) {
        log::warn!("failed {what}: {err}");
        self.status = Some(format!("Failed {what}: {err}"));
    }

    fn install_texture(&mut self, ctx: &egui::Context, img: &image::DynamicImage) {
        let rgba = img.to_rgba8();
        let size = [rgba.width() as usize, rgba.height() as usize];
        let pixels = rgba.as_flat_samples();
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_slice());
        self.image_size = (img.width() as f32, img.height() as f32);
        self.texture = Some(ctx.load_texture("image", color_image, egui::TextureOptions::LINEAR));
        self.pan = egui::Vec2::ZERO;
        self.zoom = 1.0;
    }

    // ── Coordinate mapping ─────────────────────────────────────────────────

    /// Convert image-space coords to screen-space
    fn image_to_screen(&self, canvas_rect: egui::Rect, img_pos: egui::Pos2) -> egui::Pos2 {
        let center = canvas_rect.center();
        center
            + self.pan
            + (img_pos.to_vec2() - egui::vec2(self.image_size.0, self.image_size.1) * 0.5)
                * self.zoom
    }

    /// Convert screen-space coords to image-space
    fn screen_to_image(&self, canvas_rect: egui::Rect, screen_pos: egui::Pos2) -> egui::Pos2 {
        let center = canvas_rect.center();
        let rel = screen_pos - center - self.pan;
        egui::pos2(
            rel.x / self.zoom + self.image_size.0 * 0.5,
            rel.y / self.zoom + self.image_size.1 * 0.5,
        )
    }

    fn image_rect_on_screen(&self, canvas_rect: egui::Rect) -> egui::Rect {
        let top_left = self.image_to_screen(canvas_rect, egui::Pos2::ZERO);
        let bot_right =
            self.image_to_screen(canvas_rect, egui::pos2(self.image_size.0, self.image_size.1));
        egui::Rect::from_min_max(top_left, bot_right)
    }

    fn bounds_on_screen(&self, canvas_rect: egui::Rect, bounds: RectBounds) -> egui::Rect {
        let min = self.image_to_screen(canvas_rect, egui::pos2(bounds.x as f32, bounds.y as f32));
        let max = self.image_to_screen(
            canvas_rect,
            egui::pos2(bounds.right() as f32, bounds.bottom() as f32),
        );
        egui::Rect::from_two_pos(min, max)
    }

    fn image_point_at(&self, canvas_rect: egui::Rect, screen_pos: egui::Pos2) -> ImagePoint {
        let img_pos = self.screen_to_image(canvas_rect, screen_pos);
        ImagePoint {
            x: img_pos.x.round() as i32,
            y: img_pos.y.round() as i32,
        }
    }

    // ── Painting ───────────────────────────────────────────────────────────

    fn draw_rectangles(&self, painter: &egui::Painter, canvas_rect: egui::Rect) {
        for rectangle in self.session.rectangles() {
            let rect = self.bounds_on_screen(canvas_rect, rectangle.bounds);
            painter.rect_stroke(
                rect,
                0.0,
                self.stroke_for(rectangle.sync),
                egui::StrokeKind::Middle,
            );
        }

        if let Some(draft) = self.session.draft() {
            let rect = self.bounds_on_screen(canvas_rect, draft.bounds());
            painter.rect_stroke(
                rect,
                0.0,
                egui::Stroke::new(1.5 * self.zoom, PENDING_COLOR),
                egui::StrokeKind::Middle,
            );
        }
    }

    fn stroke_for(&self, sync: SyncState) -> egui::Stroke {
        match sync {
            SyncState::Pending => egui::Stroke::new(1.5 * self.zoom, PENDING_COLOR),
            SyncState::Confirmed => egui::Stroke::new(3.0 * self.zoom, CONFIRMED_COLOR),
            SyncState::Deleting => egui::Stroke::new(1.5 * self.zoom, DELETING_COLOR),
        }
    }

    fn canvas_message(&self) -> Option<&'static str> {
        if self.texture.is_some() {
            return None;
        }
        if self.session.queue_drained() {
            Some("All images described")
        } else if self.loading_image || self.fetching_list {
            Some("Loading…")
        } else {
            Some("No image")
        }
    }

    // ── UI actions ─────────────────────────────────────────────────────────

    fn ask_undo(&mut self) {
        if self.session.undo_target().is_some() && self.confirm.is_none() {
            self.confirm = Some(PendingConfirm::UndoLast);
        }
    }

    fn ask_clear(&mut self) {
        if self.session.can_clear() && self.confirm.is_none() {
            self.confirm = Some(PendingConfirm::ClearAll);
        }
    }

    fn save_and_advance(&mut self, ctx: &egui::Context) {
        if self.fetching_list {
            return; // an advance is already under way
        }
        if let Some(image_id) = self.session.begin_save() {
            log::info!("marking image {image_id} done");
            self.request_mark_done(ctx, image_id);
        }
    }

    fn confirm_dialog(&mut self, ctx: &egui::Context) {
        let Some(pending) = self.confirm else {
            return;
        };
        let (title, question) = match pending {
            PendingConfirm::UndoLast => (
                "Remove last description?",
                "The most recent rectangle will be deleted from the server.",
            ),
            PendingConfirm::ClearAll => (
                "Remove all descriptions?",
                "Every rectangle on this image will be deleted from the server.",
            ),
        };

        let mut decision = None;
        egui::Window::new(title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(question);
                ui.horizontal(|ui| {
                    if ui.button("Delete").clicked() {
                        decision = Some(true);
                    }
                    if ui.button("Keep").clicked() {
                        decision = Some(false);
                    }
                });
            });

        match decision {
            Some(true) => {
                self.confirm = None;
                match pending {
                    PendingConfirm::UndoLast => {
                        if let Some((image_id, description_id)) = self.session.begin_undo() {
                            self.request_delete(ctx, image_id, description_id);
                        }
                    }
                    PendingConfirm::ClearAll => {
                        if let Some(image_id) = self.session.begin_clear() {
                            self.request_clear(ctx, image_id);
                        }
                    }
                }
            }
            Some(false) => self.confirm = None,
            None => {}
        }
    }
}

// ── eframe App impl ────────────────────────────────────────────────────────

impl eframe::App for AnnotateApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_server_events(ctx);

        // Keyboard shortcut: Ctrl+Z asks to undo, same as the button
        let undo_shortcut = ctx.input(|i| i.modifiers.ctrl && i.key_pressed(egui::Key::Z));
        if undo_shortcut {
            self.ask_undo();
        }

        // Top toolbar
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui
                    .add_enabled(
                        self.session.undo_target().is_some(),
                        egui::Button::new("Undo"),
                    )
                    .clicked()
                {
                    self.ask_undo();
                }
                if ui
                    .add_enabled(self.session.can_clear(), egui::Button::new("Clear all"))
                    .clicked()
                {
                    self.ask_clear();
                }
                ui.separator();
                if ui
                    .add_enabled(
                        self.session.image_id().is_some() && !self.fetching_list,
                        egui::Button::new("Save & next"),
                    )
                    .clicked()
                {
                    self.save_and_advance(ctx);
                }
                ui.separator();
                match self.session.image_id() {
                    Some(id) => ui.label(format!("Image {id}")),
                    None if self.session.queue_drained() => ui.label("All images described"),
                    None => ui.label("Loading…"),
                };
                ui.separator();
                ui.label(format!("Zoom: {:.0}%", self.zoom * 100.0));
            });
        });

        // Status line for failed requests
        if self.status.is_some() {
            egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    if let Some(message) = &self.status {
                        ui.colored_label(PENDING_COLOR, message);
                    }
                    if ui.button("Dismiss").clicked() {
                        self.status = None;
                    }
                });
            });
        }

        // Canvas
        egui::CentralPanel::default().show(ctx, |ui| {
            let (response, painter) =
                ui.allocate_painter(ui.available_size(), egui::Sense::click());
            let canvas_rect = response.rect;

            // Draw background
            painter.rect_filled(canvas_rect, 0.0, egui::Color32::from_gray(40));

            // Draw image
            if let Some(ref tex) = self.texture {
                let img_rect = self.image_rect_on_screen(canvas_rect);
                painter.image(
                    tex.id(),
                    img_rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            } else if let Some(message) = self.canvas_message() {
                painter.text(
                    canvas_rect.center(),
                    egui::Align2::CENTER_CENTER,
                    message,
                    egui::FontId::proportional(22.0),
                    egui::Color32::from_gray(160),
                );
            }

            // Draw finalized rectangles and the draft preview
            self.draw_rectangles(&painter, canvas_rect);

            // Handle pan (middle mouse button)
            let middle_down = ctx.input(|i| i.pointer.middle_down());
            if middle_down {
                let delta = ctx.input(|i| i.pointer.delta());
                self.pan += delta;
            }

            // Handle zoom (scroll wheel)
            let scroll_delta = ctx.input(|i| i.smooth_scroll_delta.y);
            if scroll_delta != 0.0 && response.hovered() {
                let zoom_factor = 1.0 + scroll_delta * 0.002;
                let new_zoom = (self.zoom * zoom_factor).clamp(0.1, 10.0);
                if let Some(cursor) = response.hover_pos() {
                    let center = canvas_rect.center();
                    let cursor_rel = cursor - center - self.pan;
                    self.pan -= cursor_rel * (new_zoom / self.zoom - 1.0);
                }
                self.zoom = new_zoom;
            }

            // Drafting interaction: click to anchor, move to size, click to
            // finish. Disabled while a dialog is open or no image is shown.
            if self.confirm.is_none() && self.texture.is_some() {
                if self.session.is_drafting() {
                    ctx.set_cursor_icon(egui::CursorIcon::Crosshair);
                    if let Some(pos) = response.hover_pos() {
                        let at = self.image_point_at(canvas_rect, pos);
                        self.session.pointer_moved(at);
                    }
                }

                if response.clicked() {
                    if let Some(pos) = response.interact_pointer_pos() {
                        let at = self.image_point_at(canvas_rect, pos);
                        if let Some((image_id, description)) = self.session.click(at) {
                            self.request_create(ctx, image_id, description);
                        }
                    }
                }
            }
        });

        self.confirm_dialog(ctx);
    }
}
