//! Entry point for the OBJ viewer.
//! Logging + command-line configuration.

use std::path::PathBuf;

use anyhow::Result;
use platform::ViewerConfig;

fn parse_backend(val: &str) -> wgpu::Backends {
    match val.to_ascii_lowercase().as_str() {
        "auto" => wgpu::Backends::all(),
        "vulkan" | "vk" => wgpu::Backends::VULKAN,
        "dx12" | "d3d12" => wgpu::Backends::DX12,
        "metal" | "mtl" => wgpu::Backends::METAL,
        "gl" | "opengl" | "gles" => wgpu::Backends::GL,
        other => {
            log::warn!("Unknown backend '{}', falling back to auto.", other);
            wgpu::Backends::all()
        }
    }
}

/// Accepts:
///   --gpu-backend=auto|vulkan|dx12|metal|gl
///   --size=WxH | --width=W --height=H
///   --obj=PATH --texture=PATH --no-flip
///   bare `*.obj` / `*.png` paths
fn parse_args<I: IntoIterator<Item = String>>(args: I) -> ViewerConfig {
    let mut cfg = ViewerConfig::default();
    let mut w: Option<u32> = None;
    let mut h: Option<u32> = None;

    for arg in args {
        if let Some(v) = arg.strip_prefix("--gpu-backend=") {
            cfg.backends = parse_backend(v);
        } else if let Some(v) = arg.strip_prefix("--size=") {
            if let Some((sw, sh)) = v.split_once('x').or_else(|| v.split_once('X')) {
                if let (Ok(pw), Ok(ph)) = (sw.parse::<u32>(), sh.parse::<u32>()) {
                    w = Some(pw);
                    h = Some(ph);
                }
            }
        } else if let Some(v) = arg.strip_prefix("--width=") {
            if let Ok(pw) = v.parse::<u32>() {
                w = Some(pw);
            }
        } else if let Some(v) = arg.strip_prefix("--height=") {
            if let Ok(ph) = v.parse::<u32>() {
                h = Some(ph);
            }
        } else if let Some(v) = arg.strip_prefix("--obj=") {
            cfg.obj_path = Some(PathBuf::from(v));
        } else if let Some(v) = arg.strip_prefix("--texture=") {
            cfg.texture_path = Some(PathBuf::from(v));
        } else if arg == "--no-flip" {
            cfg.flip_texture = false;
        } else if arg.starts_with("--") {
            log::warn!("Unknown option '{}'", arg);
        } else {
            let lower = arg.to_ascii_lowercase();
            if lower.ends_with(".obj") {
                cfg.obj_path = Some(PathBuf::from(arg));
            } else if lower.ends_with(".png") {
                cfg.texture_path = Some(PathBuf::from(arg));
            } else {
                log::warn!("Ignoring argument '{}'", arg);
            }
        }
    }

    cfg.width = w.unwrap_or(cfg.width).max(1);
    cfg.height = h.unwrap_or(cfg.height).max(1);
    cfg
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = parse_args(std::env::args().skip(1));
    log::info!(
        "Starting OBJ viewer. Backend: {:?}, window_size={}x{}, obj={:?}, texture={:?}, flip={}",
        cfg.backends,
        cfg.width,
        cfg.height,
        cfg.obj_path,
        cfg.texture_path,
        cfg.flip_texture
    );

    platform::run_viewer(cfg)?;

    log::info!("Graceful shutdown. Bye!");
    Ok(())
}
