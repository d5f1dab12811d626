//! Tests for tile PNG encoding and decoding.

use image::Rgba;
use renderer::leaf::LeafRenderer;
use renderer::png::{create_png, create_png_auto, decode_tile, encode_tile};
use renderer::settings::RenderSettings;
use renderer::RenderedTile;
use tile_common::{TileCoord, TileError};

#[test]
fn test_rendered_tile_survives_encoding() {
    let r = LeafRenderer::from_settings(&RenderSettings {
        max_iterations: 200,
        ..RenderSettings::default()
    });
    let tile = r.render(TileCoord::new(1, 0, 0), 64, 3).unwrap();

    let png = encode_tile(&tile).unwrap();
    let decoded = decode_tile(&png).unwrap();
    assert_eq!(decoded.dimensions(), (64, 64));
    assert_eq!(decoded.as_raw(), tile.as_raw());
}

#[test]
fn test_partially_transparent_tile_survives_encoding() {
    // A composite with a missing quadrant: few colors, indexed path with tRNS
    let mut tile = RenderedTile::new(8, 8);
    for y in 0..8 {
        for x in 0..8 {
            if x >= 4 || y >= 4 {
                tile.put_pixel(x, y, Rgba([0x66, 0x66, 0x66, 0xFF]));
            }
        }
    }

    let decoded = decode_tile(&encode_tile(&tile).unwrap()).unwrap();
    assert_eq!(decoded.get_pixel(0, 0).0, [0, 0, 0, 0]);
    assert_eq!(decoded.get_pixel(7, 7).0, [0x66, 0x66, 0x66, 0xFF]);
}

#[test]
fn test_indexed_smaller_than_rgba_for_flat_tile() {
    let pixels: Vec<u8> = (0..32 * 32)
        .flat_map(|i| if i % 7 == 0 { [255, 0, 0, 255] } else { [0, 0, 255, 255] })
        .collect();
    let indexed = create_png_auto(&pixels, 32, 32).unwrap();
    let rgba = create_png(&pixels, 32, 32).unwrap();
    assert!(indexed.len() < rgba.len());
}

#[test]
fn test_decode_garbage_is_error() {
    let result = decode_tile(b"definitely not a png");
    assert!(matches!(result, Err(TileError::DecodeError(_))));
}
