use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{HtmlImageElement, WebGl2RenderingContext, WebGlTexture};

use crate::error::{RenderError, RenderResult};

/// Cubemap faces in `TEXTURE_CUBE_MAP_POSITIVE_X + i` order
pub const CUBEMAP_FACES: [&str; 6] = ["left", "right", "top", "bottom", "front", "back"];

/// Sampling setup for a loaded 2D image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sampling {
    /// Mipmapped and repeating, for surface textures
    Tiled,
    /// Linear and clamped, for data textures such as height maps
    Clamped,
}

/// Ordered animation frames where some slots may never load.
///
/// Playback only cycles over the frames that are present.
#[derive(Debug)]
pub struct FrameSet<T> {
    slots: Vec<Option<T>>,
}

impl<T> FrameSet<T> {
    pub fn with_len(len: usize) -> FrameSet<T> {
        FrameSet {
            slots: (0..len).map(|_| None).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn fill(&mut self, index: usize, value: T) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(value);
        }
    }

    pub fn loaded_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Slot index of playback frame `k`, i.e. the `(k mod N)`-th loaded frame
    pub fn index_for(&self, k: u64) -> Option<usize> {
        let loaded = self.loaded_count();
        if loaded == 0 {
            return None;
        }
        let wanted = (k % loaded as u64) as usize;
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .nth(wanted)
            .map(|(index, _)| index)
    }

    pub fn resolve(&self, k: u64) -> Option<&T> {
        self.index_for(k)
            .and_then(|index| self.slots[index].as_ref())
    }

    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.slots.drain(..).flatten()
    }
}

/// Start loading an image; `on_load` runs once it decodes.
///
/// A failed load is logged and nothing else happens.
pub fn load_image<F>(url: &str, on_load: F) -> RenderResult<()>
where
    F: FnOnce(&HtmlImageElement) + 'static,
{
    let image = Rc::new(HtmlImageElement::new()?);

    let onload = {
        let image = image.clone();
        Closure::once_into_js(move || on_load(&image))
    };
    let onerror = {
        let url = url.to_string();
        Closure::once_into_js(move || log::warn!("Failed to load image: {}", url))
    };

    image.set_cross_origin(Some("anonymous"));
    image.set_onload(Some(onload.unchecked_ref()));
    image.set_onerror(Some(onerror.unchecked_ref()));
    image.set_src(url);
    Ok(())
}

/// Create an empty 2D texture object
pub fn create_texture(gl: &WebGl2RenderingContext) -> RenderResult<WebGlTexture> {
    gl.create_texture()
        .ok_or_else(|| RenderError::resource("Failed to create texture"))
}

/// Upload a decoded image into `texture`
pub fn upload_image(
    gl: &WebGl2RenderingContext,
    texture: &WebGlTexture,
    image: &HtmlImageElement,
    sampling: Sampling,
) -> RenderResult<()> {
    gl.bind_texture(WebGl2RenderingContext::TEXTURE_2D, Some(texture));
    gl.tex_image_2d_with_u32_and_u32_and_html_image_element(
        WebGl2RenderingContext::TEXTURE_2D,
        0,
        WebGl2RenderingContext::RGBA as i32,
        WebGl2RenderingContext::RGBA,
        WebGl2RenderingContext::UNSIGNED_BYTE,
        image,
    )?;
    let (min_filter, wrap) = match sampling {
        Sampling::Tiled => {
            gl.generate_mipmap(WebGl2RenderingContext::TEXTURE_2D);
            (
                WebGl2RenderingContext::LINEAR_MIPMAP_LINEAR,
                WebGl2RenderingContext::REPEAT,
            )
        }
        Sampling::Clamped => (
            WebGl2RenderingContext::LINEAR,
            WebGl2RenderingContext::CLAMP_TO_EDGE,
        ),
    };
    gl.tex_parameteri(
        WebGl2RenderingContext::TEXTURE_2D,
        WebGl2RenderingContext::TEXTURE_MIN_FILTER,
        min_filter as i32,
    );
    gl.tex_parameteri(
        WebGl2RenderingContext::TEXTURE_2D,
        WebGl2RenderingContext::TEXTURE_MAG_FILTER,
        WebGl2RenderingContext::LINEAR as i32,
    );
    gl.tex_parameteri(
        WebGl2RenderingContext::TEXTURE_2D,
        WebGl2RenderingContext::TEXTURE_WRAP_S,
        wrap as i32,
    );
    gl.tex_parameteri(
        WebGl2RenderingContext::TEXTURE_2D,
        WebGl2RenderingContext::TEXTURE_WRAP_T,
        wrap as i32,
    );
    gl.bind_texture(WebGl2RenderingContext::TEXTURE_2D, None);
    Ok(())
}

/// Fill a texture with a single pixel so it can be sampled before its image arrives
fn fill_placeholder(gl: &WebGl2RenderingContext, target: u32, color: [u8; 4]) -> RenderResult<()> {
    gl.tex_image_2d_with_i32_and_i32_and_i32_and_format_and_type_and_opt_u8_array(
        target,
        0,
        WebGl2RenderingContext::RGBA as i32,
        1,
        1,
        0,
        WebGl2RenderingContext::RGBA,
        WebGl2RenderingContext::UNSIGNED_BYTE,
        Some(&color[..]),
    )?;
    Ok(())
}

/// 2D texture usable immediately; the image replaces the placeholder when loaded
pub fn load_texture(
    gl: &WebGl2RenderingContext,
    url: &str,
    sampling: Sampling,
) -> RenderResult<WebGlTexture> {
    let texture = create_texture(gl)?;
    gl.bind_texture(WebGl2RenderingContext::TEXTURE_2D, Some(&texture));
    fill_placeholder(gl, WebGl2RenderingContext::TEXTURE_2D, [128, 128, 128, 255])?;
    gl.bind_texture(WebGl2RenderingContext::TEXTURE_2D, None);

    let loaded = {
        let gl = gl.clone();
        let texture = texture.clone();
        let url = url.to_string();
        move |image: &HtmlImageElement| {
            if let Err(err) = upload_image(&gl, &texture, image, sampling) {
                log::warn!("Failed to upload {}: {}", url, err);
            }
        }
    };
    load_image(url, loaded)?;
    Ok(texture)
}

/// Cubemap from six face images under `dir`, e.g. `{dir}/left.jpg`
pub fn load_cubemap(gl: &WebGl2RenderingContext, dir: &str) -> RenderResult<WebGlTexture> {
    let texture = create_texture(gl)?;
    gl.bind_texture(WebGl2RenderingContext::TEXTURE_CUBE_MAP, Some(&texture));
    for i in 0..CUBEMAP_FACES.len() as u32 {
        fill_placeholder(
            gl,
            WebGl2RenderingContext::TEXTURE_CUBE_MAP_POSITIVE_X + i,
            [90, 120, 160, 255],
        )?;
    }
    for (pname, value) in [
        (WebGl2RenderingContext::TEXTURE_MIN_FILTER, WebGl2RenderingContext::LINEAR),
        (WebGl2RenderingContext::TEXTURE_MAG_FILTER, WebGl2RenderingContext::LINEAR),
        (WebGl2RenderingContext::TEXTURE_WRAP_S, WebGl2RenderingContext::CLAMP_TO_EDGE),
        (WebGl2RenderingContext::TEXTURE_WRAP_T, WebGl2RenderingContext::CLAMP_TO_EDGE),
        (WebGl2RenderingContext::TEXTURE_WRAP_R, WebGl2RenderingContext::CLAMP_TO_EDGE),
    ] {
        gl.tex_parameteri(WebGl2RenderingContext::TEXTURE_CUBE_MAP, pname, value as i32);
    }
    gl.bind_texture(WebGl2RenderingContext::TEXTURE_CUBE_MAP, None);

    for (i, face) in CUBEMAP_FACES.iter().enumerate() {
        let url = format!("{}/{}.jpg", dir, face);
        let failed_url = url.clone();
        let gl = gl.clone();
        let texture = texture.clone();
        let face_target = WebGl2RenderingContext::TEXTURE_CUBE_MAP_POSITIVE_X + i as u32;
        load_image(&url, move |image: &HtmlImageElement| {
            gl.bind_texture(WebGl2RenderingContext::TEXTURE_CUBE_MAP, Some(&texture));
            let uploaded = gl.tex_image_2d_with_u32_and_u32_and_html_image_element(
                face_target,
                0,
                WebGl2RenderingContext::RGB as i32,
                WebGl2RenderingContext::RGB,
                WebGl2RenderingContext::UNSIGNED_BYTE,
                image,
            );
            gl.bind_texture(WebGl2RenderingContext::TEXTURE_CUBE_MAP, None);
            if uploaded.is_err() {
                log::warn!("Cubemap texture failed to load at path: {}", failed_url);
            }
        })?;
    }

    Ok(texture)
}

/// Shared, progressively filled frame set
pub type SharedFrames = Rc<RefCell<FrameSet<WebGlTexture>>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_set_cycles_modulo_length() {
        let mut frames = FrameSet::with_len(5);
        for i in 0..5 {
            frames.fill(i, i * 10);
        }
        for k in 0..23u64 {
            assert_eq!(frames.index_for(k), Some((k % 5) as usize));
        }
        assert_eq!(frames.resolve(7), Some(&20));
    }

    #[test]
    fn test_missing_frames_are_skipped() {
        let mut frames = FrameSet::with_len(5);
        frames.fill(0, 'a');
        frames.fill(2, 'c');
        frames.fill(4, 'e');

        assert_eq!(frames.loaded_count(), 3);
        let played: Vec<char> = (0..6).map(|k| *frames.resolve(k).unwrap()).collect();
        assert_eq!(played, vec!['a', 'c', 'e', 'a', 'c', 'e']);
    }

    #[test]
    fn test_empty_set_resolves_nothing() {
        let frames: FrameSet<u8> = FrameSet::with_len(3);
        assert_eq!(frames.index_for(0), None);
        assert!(frames.resolve(42).is_none());
        assert!(!frames.is_empty());
    }

    #[test]
    fn test_fill_out_of_range_is_ignored() {
        let mut frames = FrameSet::with_len(2);
        frames.fill(5, 1u8);
        assert_eq!(frames.loaded_count(), 0);
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_drain_yields_loaded_frames() {
        let mut frames = FrameSet::with_len(4);
        frames.fill(1, 1u8);
        frames.fill(3, 3u8);
        let drained: Vec<u8> = frames.drain().collect();
        assert_eq!(drained, vec![1, 3]);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_face_order() {
        assert_eq!(CUBEMAP_FACES[0], "left");
        assert_eq!(CUBEMAP_FACES[5], "back");
    }
}
