// Local window: the shared paint raster blitted large, active bubbles as
// tinted boxes, a frame tinted with the eased ambient colour. Also the
// source of bubble geometry: every frame the rendered rects are published
// to the client's layout table, which is what ghost capture looks up.

use minifb::{Key, Window, WindowOptions};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use crate::bubbles::Rect;
use crate::canvas::PaintBuffer;
use crate::client::BbyClient;
use crate::colour::Rgb;

const WIDTH: usize = 640;
const HEIGHT: usize = 640;
const CANVAS_SCALE: usize = 8;
const CANVAS_X: usize = 64;
const CANVAS_Y: usize = 64;

fn pack(c: Rgb) -> u32 {
    ((c.r as u32) << 16) | ((c.g as u32) << 8) | c.b as u32
}

fn dim(colour: u32, shift: u32) -> u32 {
    ((colour >> 16 & 0xFF) >> shift) << 16
        | ((colour >> 8 & 0xFF) >> shift) << 8
        | (colour & 0xFF) >> shift
}

// Simple 3x5 pixel font
fn draw_char(buffer: &mut [u32], x: usize, y: usize, ch: char, color: u32) {
    let pattern: &[u8] = match ch.to_ascii_lowercase() {
        '0' | 'o' => &[0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => &[0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => &[0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => &[0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => &[0b101, 0b101, 0b111, 0b001, 0b001],
        '5' | 's' => &[0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => &[0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => &[0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => &[0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => &[0b111, 0b101, 0b111, 0b001, 0b111],
        '.' => &[0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => &[0b000, 0b000, 0b000, 0b010, 0b100],
        '-' => &[0b000, 0b000, 0b111, 0b000, 0b000],
        ':' => &[0b000, 0b010, 0b000, 0b010, 0b000],
        '?' => &[0b111, 0b001, 0b011, 0b000, 0b010],
        '!' => &[0b010, 0b010, 0b010, 0b000, 0b010],
        ' ' => &[0b000, 0b000, 0b000, 0b000, 0b000],
        'a' => &[0b111, 0b101, 0b111, 0b101, 0b101],
        'b' => &[0b110, 0b101, 0b110, 0b101, 0b110],
        'c' => &[0b111, 0b100, 0b100, 0b100, 0b111],
        'd' => &[0b110, 0b101, 0b101, 0b101, 0b110],
        'e' => &[0b111, 0b100, 0b111, 0b100, 0b111],
        'f' => &[0b111, 0b100, 0b111, 0b100, 0b100],
        'g' => &[0b111, 0b100, 0b101, 0b101, 0b111],
        'h' => &[0b101, 0b101, 0b111, 0b101, 0b101],
        'i' => &[0b111, 0b010, 0b010, 0b010, 0b111],
        'j' => &[0b001, 0b001, 0b001, 0b101, 0b111],
        'k' => &[0b101, 0b110, 0b100, 0b110, 0b101],
        'l' => &[0b100, 0b100, 0b100, 0b100, 0b111],
        'm' => &[0b101, 0b111, 0b111, 0b101, 0b101],
        'n' => &[0b101, 0b111, 0b111, 0b111, 0b101],
        'p' => &[0b111, 0b101, 0b111, 0b100, 0b100],
        'q' => &[0b111, 0b101, 0b111, 0b001, 0b001],
        'r' => &[0b110, 0b101, 0b110, 0b101, 0b101],
        't' => &[0b111, 0b010, 0b010, 0b010, 0b010],
        'u' => &[0b101, 0b101, 0b101, 0b101, 0b111],
        'v' => &[0b101, 0b101, 0b101, 0b101, 0b010],
        'w' => &[0b101, 0b101, 0b111, 0b111, 0b101],
        'x' => &[0b101, 0b101, 0b010, 0b101, 0b101],
        'y' => &[0b101, 0b101, 0b111, 0b010, 0b010],
        'z' => &[0b111, 0b001, 0b010, 0b100, 0b111],
        _ => &[0b000, 0b000, 0b000, 0b000, 0b000],
    };

    for (dy, &row) in pattern.iter().enumerate() {
        if y + dy >= HEIGHT { break; }
        for dx in 0..3 {
            if x + dx >= WIDTH { break; }
            if row & (1 << (2 - dx)) != 0 {
                let idx = (y + dy) * WIDTH + (x + dx);
                buffer[idx] = color;
            }
        }
    }
}

fn draw_text(buffer: &mut [u32], x: usize, y: usize, text: &str, color: u32) {
    let mut offset_x = x;
    for ch in text.chars() {
        if offset_x + 4 >= WIDTH { break; }
        draw_char(buffer, offset_x, y, ch, color);
        offset_x += 4;
    }
}

fn fill_rect(buffer: &mut [u32], x: usize, y: usize, w: usize, h: usize, color: u32) {
    for yy in y..(y + h).min(HEIGHT) {
        for xx in x..(x + w).min(WIDTH) {
            buffer[yy * WIDTH + xx] = color;
        }
    }
}

fn stroke_rect(buffer: &mut [u32], x: usize, y: usize, w: usize, h: usize, color: u32) {
    if x >= WIDTH || y >= HEIGHT || w == 0 || h == 0 {
        return;
    }
    for xx in x..(x + w).min(WIDTH) {
        buffer[y * WIDTH + xx] = color;
        if y + h - 1 < HEIGHT {
            buffer[(y + h - 1) * WIDTH + xx] = color;
        }
    }
    for yy in y..(y + h).min(HEIGHT) {
        buffer[yy * WIDTH + x] = color;
        if x + w - 1 < WIDTH {
            buffer[yy * WIDTH + x + w - 1] = color;
        }
    }
}

pub fn spawn_visualizer(client: Arc<BbyClient>) {
    thread::spawn(move || {
        let mut window = match Window::new(
            "bby — remote creature mirror",
            WIDTH,
            HEIGHT,
            WindowOptions::default(),
        ) {
            Ok(w) => w,
            Err(e) => {
                log::warn!("no display, running headless: {e}");
                return;
            }
        };
        window.set_target_fps(30);

        let mut buffer: Vec<u32> = vec![0; WIDTH * HEIGHT];
        let mut canvas_cache: Vec<u32> = vec![0; WIDTH * HEIGHT];
        let mut seen_redraw = u64::MAX;

        while window.is_open() && !window.is_key_down(Key::Escape) {
            let ambient = client.current_colour.lock().unwrap().rounded();
            let frame_colour = pack(ambient);

            for px in buffer.iter_mut() {
                *px = dim(frame_colour, 3);
            }

            // re-blit the raster only when the paint consumer signalled
            let redraw = client.redraw.load(Ordering::Relaxed);
            let side = {
                let paint = client.paint.lock().unwrap();
                if let Some(buf) = paint.as_ref() {
                    if redraw != seen_redraw {
                        seen_redraw = redraw;
                        blit_canvas(&mut canvas_cache, buf);
                    }
                    buf.width.max(buf.height)
                } else {
                    0
                }
            };
            if side > 0 {
                copy_canvas(&mut buffer, &canvas_cache, side);
                stroke_rect(
                    &mut buffer,
                    CANVAS_X - 1,
                    CANVAS_Y - 1,
                    side * CANVAS_SCALE + 2,
                    side * CANVAS_SCALE + 2,
                    frame_colour,
                );
            }

            // ghosts first so live bubbles draw over them
            let mut layout: HashMap<String, Rect> = HashMap::new();
            {
                let store = client.bubbles.lock().unwrap();
                for ghost in store.ghosts.iter().rev().take(12) {
                    let x = ghost.start.x.max(0.0) as usize;
                    let y = ghost.start.y.max(0.0) as usize;
                    if x < WIDTH && y < HEIGHT {
                        draw_text(&mut buffer, x, y, &ghost.text, dim(pack(ghost.bg), 1));
                    }
                }
                for bubble in store.bubbles.iter() {
                    let w = (bubble.text.len() * 4 + 8).min(WIDTH / 2);
                    let h = 13;
                    let x = (bubble.x_pct / 100.0 * WIDTH as f32) as usize;
                    let y = (bubble.y_pct / 100.0 * HEIGHT as f32) as usize;
                    fill_rect(&mut buffer, x, y, w, h, pack(bubble.bg));
                    stroke_rect(&mut buffer, x, y, w, h, pack(bubble.border));
                    draw_text(&mut buffer, x + 4, y + 4, &bubble.text, 0xFFFFFF);
                    layout.insert(
                        bubble.id.clone(),
                        Rect { x: x as f32, y: y as f32, w: w as f32, h: h as f32 },
                    );
                }
            }
            *client.layout.lock().unwrap() = layout;

            let (bubbles, ghosts) = {
                let store = client.bubbles.lock().unwrap();
                (store.bubbles.len(), store.ghosts.len())
            };
            let (eyes, mouth, speaking, speech) = {
                let mirror = client.mirror.lock().unwrap();
                (mirror.eyes, mirror.mouth, mirror.is_speaking, mirror.speech_text.clone())
            };
            draw_text(&mut buffer, 10, 10, &format!("bubbles: {bubbles}"), 0xFFFFFF);
            draw_text(&mut buffer, 10, 25, &format!("ghosts: {ghosts}"), 0xFFFFFF);
            draw_text(&mut buffer, 10, 40, &format!("eyes: {eyes} mouth: {mouth}"), 0xFFFFFF);
            if speaking {
                draw_text(&mut buffer, 10, 55, &speech, frame_colour);
            }

            if window.update_with_buffer(&buffer, WIDTH, HEIGHT).is_err() {
                break;
            }
        }
    });
}

fn blit_canvas(cache: &mut [u32], buf: &PaintBuffer) {
    for y in 0..buf.height {
        for x in 0..buf.width {
            let (r, g, b, _a) = buf.pixel(x, y);
            let colour = pack(Rgb::new(r, g, b));
            for sy in 0..CANVAS_SCALE {
                for sx in 0..CANVAS_SCALE {
                    let px = CANVAS_X + x * CANVAS_SCALE + sx;
                    let py = CANVAS_Y + y * CANVAS_SCALE + sy;
                    if px < WIDTH && py < HEIGHT {
                        cache[py * WIDTH + px] = colour;
                    }
                }
            }
        }
    }
}

fn copy_canvas(buffer: &mut [u32], cache: &[u32], side: usize) {
    for y in CANVAS_Y..(CANVAS_Y + side * CANVAS_SCALE).min(HEIGHT) {
        let row = y * WIDTH;
        let x0 = CANVAS_X;
        let x1 = (CANVAS_X + side * CANVAS_SCALE).min(WIDTH);
        buffer[row + x0..row + x1].copy_from_slice(&cache[row + x0..row + x1]);
    }
}
