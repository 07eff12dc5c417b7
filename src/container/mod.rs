//! Container images built from bundles

pub mod engine;
pub mod image;
pub mod progress;

use thiserror::Error;

use crate::archive::ArchiveError;

pub use engine::{ContainerEngine, DockerEngine, RegistryAuth};
pub use image::{image_name_for, render_dockerfile, ImageBuilder, LOCAL_IMAGE_TAG};

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("Failed to build image: {message}{}", last_output_suffix(.last_output))]
    ImageBuild {
        message: String,
        last_output: Option<String>,
    },

    #[error("Failed to push image: {message}{}", last_output_suffix(.last_output))]
    ImagePush {
        message: String,
        last_output: Option<String>,
    },

    #[error("{0}")]
    Engine(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn last_output_suffix(last_output: &Option<String>) -> String {
    match last_output {
        Some(last) => format!("\n{last}"),
        None => String::new(),
    }
}
