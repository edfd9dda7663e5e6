use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ImageId = u64;
pub type DescriptionId = u64;

/// One entry of the server's image list. The backend sends more fields
/// (source file, frame index, described flag); only the id matters here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct ImageEntry {
    pub id: ImageId,
}

/// A persisted rectangular description of an image region.
///
/// `x,y` is the top-left corner in image pixels; `width,height` are
/// non-negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub id: DescriptionId,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),
}

/// Blocking client for the description server. Cheap to clone; clones share
/// the underlying connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = reqwest::blocking::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// GET `/images`: ids of the images still waiting for descriptions,
    /// in ascending order.
    pub fn list_images(&self) -> Result<Vec<ImageEntry>, ApiError> {
        let url = self.images_url();
        let images = self.get_json(&url)?.json::<Vec<ImageEntry>>()?;
        log::debug!("listed {} images from {url}", images.len());
        Ok(images)
    }

    /// GET `/image?id={id}`: the rendered image, decoded from its PNG bytes.
    pub fn fetch_image(&self, id: ImageId) -> Result<image::DynamicImage, ApiError> {
        let url = self.image_url(id);
        let response = ensure_success(self.http.get(&url).send()?, &url)?;
        let bytes = response.bytes()?;
        log::debug!("fetched image {id} ({} bytes)", bytes.len());
        Ok(image::load_from_memory(&bytes)?)
    }

    /// GET `/images/{image_id}/descriptions`: the stored rectangles.
    pub fn list_descriptions(&self, image_id: ImageId) -> Result<Vec<Description>, ApiError> {
        let url = self.descriptions_url(image_id);
        let descriptions = self.get_json(&url)?.json::<Vec<Description>>()?;
        log::debug!(
            "image {image_id} has {} stored descriptions",
            descriptions.len()
        );
        Ok(descriptions)
    }

    /// POST `/images/{image_id}/descriptions/{id}` with form-encoded
    /// geometry. The backend treats this as create-or-update.
    pub fn create_description(
        &self,
        image_id: ImageId,
        description: &Description,
    ) -> Result<(), ApiError> {
        let url = self.description_url(image_id, description.id);
        let form = [
            ("x", description.x.to_string()),
            ("y", description.y.to_string()),
            ("width", description.width.to_string()),
            ("height", description.height.to_string()),
        ];
        ensure_success(self.http.post(&url).form(&form).send()?, &url)?;
        log::debug!("stored description {} for image {image_id}", description.id);
        Ok(())
    }

    /// DELETE `/images/{image_id}/descriptions/{description_id}`.
    pub fn delete_description(
        &self,
        image_id: ImageId,
        description_id: DescriptionId,
    ) -> Result<(), ApiError> {
        let url = self.description_url(image_id, description_id);
        ensure_success(self.http.delete(&url).send()?, &url)?;
        log::debug!("deleted description {description_id} of image {image_id}");
        Ok(())
    }

    /// DELETE `/images/{image_id}/descriptions`: drop every stored rectangle.
    pub fn delete_all_descriptions(&self, image_id: ImageId) -> Result<(), ApiError> {
        let url = self.descriptions_url(image_id);
        ensure_success(self.http.delete(&url).send()?, &url)?;
        log::debug!("deleted all descriptions of image {image_id}");
        Ok(())
    }

    /// PUT `/images/{image_id}`: mark the image as described. Idempotent.
    pub fn mark_described(&self, image_id: ImageId) -> Result<(), ApiError> {
        let url = format!("{}/images/{image_id}", self.base_url);
        ensure_success(self.http.put(&url).send()?, &url)?;
        log::debug!("marked image {image_id} as described");
        Ok(())
    }

    fn get_json(&self, url: &str) -> Result<reqwest::blocking::Response, ApiError> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?;
        ensure_success(response, url)
    }

    fn images_url(&self) -> String {
        format!("{}/images", self.base_url)
    }

    fn image_url(&self, id: ImageId) -> String {
        format!("{}/image?id={id}", self.base_url)
    }

    fn descriptions_url(&self, image_id: ImageId) -> String {
        format!("{}/images/{image_id}/descriptions", self.base_url)
    }

    fn description_url(&self, image_id: ImageId, description_id: DescriptionId) -> String {
        format!(
            "{}/images/{image_id}/descriptions/{description_id}",
            self.base_url
        )
    }
}

fn ensure_success(
    response: reqwest::blocking::Response,
    url: &str,
) -> Result<reqwest::blocking::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::Status {
            status,
            url: url.to_string(),
        })
    }
}
