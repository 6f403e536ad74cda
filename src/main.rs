use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::info;
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::run_return::EventLoopExtRunReturn;
use winit::window::WindowBuilder;

use umbra_runtime::app::{active_light, camera_from_objects, print_probe_report};
use umbra_runtime::{OperatorControls, Renderer, SamplerFilter, Scene};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let scene = Arc::new(
        Scene::from_path(&options.path)
            .with_context(|| format!("failed to load scene {}", options.path))?,
    );

    println!(
        "Loaded scene with {} objects ({} lights)",
        scene.objects.len(),
        scene.lights.len()
    );
    for object in &scene.objects {
        println!(" - {} ({})", object.name, object.object_type);
    }

    let mut frustum = active_light(&scene).frustum;
    if let Some(near) = options.shadow_near {
        frustum.near = near;
    }
    if let Some(far) = options.shadow_far {
        frustum.far = far;
    }
    let controls = Arc::new(OperatorControls::new(options.filter, frustum));

    if options.summary_only {
        run_headless(&scene, &controls)
    } else {
        match run_interactive(Arc::clone(&scene), Arc::clone(&controls)) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.downcast_ref::<WindowInitError>().is_some() {
                    eprintln!(
                        "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                    );
                    run_headless(&scene, &controls)
                } else {
                    Err(err)
                }
            }
        }
    }
}

fn run_headless(scene: &Scene, controls: &OperatorControls) -> Result<()> {
    print_probe_report(scene, controls.filter(), controls.frustum());
    Ok(())
}

fn run_interactive(scene: Arc<Scene>, controls: Arc<OperatorControls>) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop =
        event_loop.map_err(|panic| WindowInitError::from_panic("event loop", panic))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Umbra Runtime")
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let renderer = block_on(Renderer::new(Arc::clone(&window), Arc::clone(&scene)))?;

    let mut app = AppState {
        renderer,
        scene,
        controls,
        last_error: None,
    };

    let mut event_loop = event_loop;
    event_loop.run_return(|event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        if let Err(err) = app.process_event(&event, control_flow) {
            app.last_error = Some(err);
            control_flow.set_exit();
        }
    });

    if let Some(err) = app.last_error {
        return Err(err);
    }

    Ok(())
}

struct AppState {
    renderer: Renderer,
    scene: Arc<Scene>,
    controls: Arc<OperatorControls>,
    last_error: Option<anyhow::Error>,
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

impl AppState {
    fn process_event(&mut self, event: &Event<()>, control_flow: &mut ControlFlow) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.renderer.window_id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        control_flow.set_exit();
                    }
                    WindowEvent::Resized(size) => {
                        self.renderer.resize(*size);
                    }
                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                        self.renderer.resize(**new_inner_size);
                    }
                    WindowEvent::KeyboardInput { input, .. } => {
                        self.handle_keyboard(input, control_flow);
                    }
                    _ => {}
                }
            }
            Event::RedrawRequested(window_id) if *window_id == self.renderer.window_id() => {
                let aspect = self.renderer_aspect();
                let camera = camera_from_objects(&self.scene.objects, aspect);
                let light = active_light(&self.scene);
                self.renderer.update_globals(
                    &camera,
                    &light,
                    self.controls.frustum(),
                    self.controls.filter(),
                );
                if let Err(err) = self.renderer.render(&self.scene.objects) {
                    match err {
                        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                            let size = self.renderer.window().inner_size();
                            self.renderer.resize(size);
                        }
                        wgpu::SurfaceError::OutOfMemory => {
                            return Err(anyhow!("GPU is out of memory"));
                        }
                        wgpu::SurfaceError::Timeout => {
                            info!("Surface timeout; retrying next frame");
                        }
                    }
                }
            }
            Event::MainEventsCleared => {
                self.renderer.window().request_redraw();
            }
            _ => {}
        }
        Ok(())
    }

    fn renderer_aspect(&self) -> f32 {
        let size = self.renderer.window().inner_size();
        if size.height == 0 {
            1.0
        } else {
            size.width as f32 / size.height as f32
        }
    }

    fn handle_keyboard(&self, input: &KeyboardInput, control_flow: &mut ControlFlow) {
        if input.state != ElementState::Pressed {
            return;
        }
        match input.virtual_keycode {
            Some(VirtualKeyCode::F) => {
                let filter = self.controls.cycle_filter();
                info!("shadow sampler filter: {}", filter.label());
            }
            Some(VirtualKeyCode::N) => {
                let frustum = self.controls.cycle_frustum();
                info!(
                    "shadow frustum: near {:.1}, far {:.1}",
                    frustum.near, frustum.far
                );
            }
            Some(VirtualKeyCode::Escape) => {
                control_flow.set_exit();
            }
            _ => {}
        }
    }
}

struct CliOptions {
    path: String,
    summary_only: bool,
    filter: SamplerFilter,
    shadow_near: Option<f32>,
    shadow_far: Option<f32>,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(
                "Usage: umbra-runtime <scene.xml> [--summary-only] [--sampler <nearest|linear|pcf|default>] [--shadow-near N] [--shadow-far N]"
            ));
        };
        let mut summary_only = false;
        let mut filter = SamplerFilter::default();
        let mut shadow_near = None;
        let mut shadow_far = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => summary_only = true,
                "--sampler" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--sampler requires a value"))?;
                    filter = value.parse()?;
                }
                "--shadow-near" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--shadow-near requires a value"))?;
                    shadow_near = Some(value.parse::<f32>().context("invalid --shadow-near")?);
                }
                "--shadow-far" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--shadow-far requires a value"))?;
                    shadow_far = Some(value.parse::<f32>().context("invalid --shadow-far")?);
                }
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Expected --summary-only, --sampler, --shadow-near or --shadow-far"
                    ));
                }
            }
        }
        Ok(Self {
            path,
            summary_only,
            filter,
            shadow_near,
            shadow_far,
        })
    }
}
