use crate::error::ServerError;
use log::info;
use shared::{Image, ImageError, Surface, TexturePacket, TexturePurpose, MAX_RELIABLE_PAYLOAD};
use std::path::Path;
use std::sync::Arc;

const DEFAULT_SURFACE_SIZE: u32 = 128;
const DEFAULT_VEHICLE_SIZE: u32 = 16;

/// Images pushed to every client during the handshake. Loaded once at
/// startup and immutable afterwards.
#[derive(Debug, Clone)]
pub struct ServerAssets {
    pub elevation: Arc<Image>,
    pub ground: Arc<Image>,
    /// Vehicle texture for clients that do not bring their own.
    pub default_vehicle: Arc<Image>,
}

impl ServerAssets {
    pub fn new(elevation: Image, ground: Image, default_vehicle: Image) -> Self {
        Self {
            elevation: Arc::new(elevation),
            ground: Arc::new(ground),
            default_vehicle: Arc::new(default_vehicle),
        }
    }

    /// Flat generated images, used when no files are configured.
    pub fn generated() -> Self {
        Self::new(
            Image::filled(DEFAULT_SURFACE_SIZE, DEFAULT_SURFACE_SIZE, [0, 0, 0]),
            Image::filled(DEFAULT_SURFACE_SIZE, DEFAULT_SURFACE_SIZE, [60, 140, 60]),
            Image::filled(DEFAULT_VEHICLE_SIZE, DEFAULT_VEHICLE_SIZE, [200, 40, 40]),
        )
    }

    /// Loads each configured image, falling back to the generated one.
    ///
    /// Fails if a file cannot be read, or if an image is too large to be
    /// sent to clients during the handshake.
    pub fn load(
        elevation: Option<&Path>,
        ground: Option<&Path>,
        default_vehicle: Option<&Path>,
    ) -> Result<Self, ServerError> {
        let generated = Self::generated();
        let assets = Self {
            elevation: load_or(elevation, "surface elevation", generated.elevation)?,
            ground: load_or(ground, "surface texture", generated.ground)?,
            default_vehicle: load_or(default_vehicle, "vehicle texture", generated.default_vehicle)?,
        };
        assets.validate()?;
        Ok(assets)
    }

    /// Checks that every image fits in a single reliable-channel packet
    pub fn validate(&self) -> Result<(), ServerError> {
        ensure_servable("surface elevation", &self.elevation)?;
        ensure_servable("surface texture", &self.ground)?;
        ensure_servable("vehicle texture", &self.default_vehicle)
    }

    pub fn surface(&self) -> Surface {
        Surface::new(Arc::clone(&self.elevation), Arc::clone(&self.ground))
    }
}

fn load_or(
    path: Option<&Path>,
    what: &'static str,
    fallback: Arc<Image>,
) -> Result<Arc<Image>, ServerError> {
    match path {
        Some(path) => {
            let image = Image::load(path).map_err(|source| ServerError::Asset { what, source })?;
            info!(
                "Loaded {} from {} ({}x{})",
                what,
                path.display(),
                image.width,
                image.height
            );
            Ok(Arc::new(image))
        }
        None => Ok(fallback),
    }
}

fn ensure_servable(what: &'static str, image: &Image) -> Result<(), ServerError> {
    let packet = TexturePacket {
        purpose: TexturePurpose::PostTexture,
        target_id: 0,
        image: Some(image.clone()),
    };
    let size = packet.payload_size();
    let max = MAX_RELIABLE_PAYLOAD as u64;
    if size > max {
        return Err(ServerError::Asset {
            what,
            source: ImageError::TooLarge {
                width: image.width,
                height: image.height,
                size,
                max,
            },
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_assets() {
        let assets = ServerAssets::load(None, None, None).unwrap();
        assert_eq!(assets.elevation.width, DEFAULT_SURFACE_SIZE);
        assert_eq!(assets.default_vehicle.width, DEFAULT_VEHICLE_SIZE);
        assert!(Arc::ptr_eq(&assets.surface().texture, &assets.ground));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let result = ServerAssets::load(Some(Path::new("/no/such/elevation.ppm")), None, None);
        assert!(matches!(
            result,
            Err(ServerError::Asset {
                what: "surface elevation",
                ..
            })
        ));
    }

    #[test]
    fn test_oversize_file_is_fatal() {
        let path = std::env::temp_dir().join(format!("oversize-elevation-{}.ppm", std::process::id()));
        let mut bytes = b"P6\n1200 1200\n255\n".to_vec();
        bytes.resize(bytes.len() + 1200 * 1200 * 3, 0);
        std::fs::write(&path, bytes).unwrap();

        let result = ServerAssets::load(Some(&path), None, None);
        std::fs::remove_file(&path).unwrap();

        match result {
            Err(ServerError::Asset {
                what: "surface elevation",
                source: ImageError::TooLarge { size, max, .. },
            }) => {
                assert_eq!(size, 1200 * 1200 * 3 + 25);
                assert_eq!(max, MAX_RELIABLE_PAYLOAD as u64);
            }
            other => panic!("expected an oversize asset error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_checks_every_image() {
        let big = Image::filled(1200, 1200, [0, 0, 0]);
        let small = Image::filled(4, 4, [0, 0, 0]);

        let assets = ServerAssets::new(small.clone(), small.clone(), big);
        assert!(matches!(
            assets.validate(),
            Err(ServerError::Asset {
                what: "vehicle texture",
                ..
            })
        ));

        // 1024x1024 RGB is 3 MiB, comfortably inside the limit.
        let three_mib = Image::filled(1024, 1024, [0, 0, 0]);
        assert!(ServerAssets::new(three_mib, small.clone(), small).validate().is_ok());
    }
}
