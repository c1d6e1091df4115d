use uuid::Uuid;

use super::repo_types::ReviewPatch;
use crate::{
    error::{AppError, AppResult},
    images::{delete_image, upload_image, MultipartForm, StoredImage},
    state::AppState,
};

pub const MAX_IMAGES: usize = 5;
const TITLE_MAX: usize = 100;
const COMMENT_MAX: usize = 1000;
const IMAGE_FOLDER: &str = "reviews";

/// Text fields of a new review.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewFields {
    pub product_id: Uuid,
    pub rating: i16,
    pub title: Option<String>,
    pub comment: String,
}

fn check_rating(rating: i16) -> AppResult<i16> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::bad_request("Rating must be between 1 and 5"));
    }
    Ok(rating)
}

fn check_title(title: &str) -> AppResult<String> {
    if title.chars().count() > TITLE_MAX {
        return Err(AppError::bad_request(
            "Title cannot be longer than 100 characters",
        ));
    }
    Ok(title.to_string())
}

fn check_comment(comment: &str) -> AppResult<String> {
    if comment.chars().count() > COMMENT_MAX {
        return Err(AppError::bad_request(
            "Comment cannot be longer than 1000 characters",
        ));
    }
    Ok(comment.to_string())
}

fn check_image_count(form: &MultipartForm) -> AppResult<()> {
    if form.files("images").count() > MAX_IMAGES {
        return Err(AppError::bad_request("You can upload at most 5 images"));
    }
    Ok(())
}

/// A review keeps at most five images across all its edits.
pub fn check_room_for_images(existing: usize, form: &MultipartForm) -> AppResult<()> {
    if existing + form.files("images").count() > MAX_IMAGES {
        return Err(AppError::bad_request(format!(
            "A review can hold at most {MAX_IMAGES} images; it already has {existing}"
        )));
    }
    Ok(())
}

pub fn parse_new(form: &MultipartForm) -> AppResult<ReviewFields> {
    check_image_count(form)?;
    let product_id = form
        .parse::<Uuid>("productId")?
        .ok_or_else(|| AppError::bad_request("Product id is required"))?;
    let rating = form
        .parse::<i16>("rating")?
        .ok_or_else(|| AppError::bad_request("Rating is required"))?;
    let comment = form
        .text("comment")
        .ok_or_else(|| AppError::bad_request("Comment is required"))?;

    Ok(ReviewFields {
        product_id,
        rating: check_rating(rating)?,
        title: form.text("title").map(check_title).transpose()?,
        comment: check_comment(comment)?,
    })
}

/// Fields present in the form become the patch. Images are added later.
pub fn parse_patch(form: &MultipartForm) -> AppResult<ReviewPatch> {
    check_image_count(form)?;
    Ok(ReviewPatch {
        rating: form.parse::<i16>("rating")?.map(check_rating).transpose()?,
        title: form.text("title").map(check_title).transpose()?,
        comment: form.text("comment").map(check_comment).transpose()?,
        images: Vec::new(),
    })
}

/// Uploads every `images` file. If one fails, those already stored are
/// removed again.
pub async fn upload_images(state: &AppState, form: &MultipartForm) -> AppResult<Vec<StoredImage>> {
    let mut stored = Vec::new();
    for file in form.files("images") {
        match upload_image(state, IMAGE_FOLDER, file).await {
            Ok(image) => stored.push(image),
            Err(e) => {
                discard_images(state, &stored).await;
                return Err(e);
            }
        }
    }
    Ok(stored)
}

pub async fn discard_images(state: &AppState, images: &[StoredImage]) {
    for image in images {
        delete_image(state, &image.public_id).await;
    }
}
