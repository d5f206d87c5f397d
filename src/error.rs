//! Error types for the cloth simulator.
//!
//! This module provides error types for GPU initialization, mesh and scene
//! loading, topology validation, parameter files and the solver.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur during GPU initialization or device work.
#[derive(Debug)]
pub enum GpuError {
    /// Failed to create a surface for rendering.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
    /// A compute kernel or render pipeline failed validation.
    PipelineBuild { label: String, message: String },
    /// Buffer creation, encoding or submission was rejected by the device.
    Validation { label: String, message: String },
    /// The device stopped answering (map callback never fired).
    DeviceLost,
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::SurfaceCreation(e) => write!(f, "Failed to create GPU surface: {}", e),
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
            GpuError::PipelineBuild { label, message } => {
                write!(f, "Failed to build '{}': {}", label, message)
            }
            GpuError::Validation { label, message } => {
                write!(f, "GPU validation failed in '{}': {}", label, message)
            }
            GpuError::DeviceLost => write!(f, "GPU device lost"),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::SurfaceCreation(e) => Some(e),
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::CreateSurfaceError> for GpuError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        GpuError::SurfaceCreation(e)
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors raised while deriving constraint topology from a triangle list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// A triangle references a vertex that does not exist.
    VertexOutOfRange { triangle: u32, vertex: u32, vertex_count: u32 },
    /// A triangle uses the same vertex twice.
    DegenerateTriangle { triangle: u32 },
    /// An edge is shared by more than two triangles.
    NonManifoldEdge { a: u32, b: u32, triangles: Vec<u32> },
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::VertexOutOfRange { triangle, vertex, vertex_count } => write!(
                f,
                "Triangle {} references vertex {} but the mesh has {} vertices",
                triangle, vertex, vertex_count
            ),
            TopologyError::DegenerateTriangle { triangle } => {
                write!(f, "Triangle {} repeats a vertex index", triangle)
            }
            TopologyError::NonManifoldEdge { a, b, triangles } => write!(
                f,
                "Edge ({}, {}) is shared by {} triangles {:?}; cloth meshes must be manifold",
                a,
                b,
                triangles.len(),
                triangles
            ),
        }
    }
}

impl std::error::Error for TopologyError {}

/// Errors that can occur while loading mesh files.
#[derive(Debug)]
pub enum MeshError {
    /// Failed to read file from disk.
    Io { path: PathBuf, source: std::io::Error },
    /// A line of an OBJ file could not be parsed.
    Parse { line: usize, message: String },
    /// The file contained no triangles.
    Empty,
    /// A `builtin:` path named an unknown generator.
    UnknownBuiltin(String),
    /// A builtin grid would exceed [`MAX_GRID_VERTICES`](crate::mesh::MAX_GRID_VERTICES).
    GridTooLarge { cols: u32, rows: u32 },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshError::Io { path, source } => {
                write!(f, "Failed to read mesh {}: {}", path.display(), source)
            }
            MeshError::Parse { line, message } => write!(f, "OBJ line {}: {}", line, message),
            MeshError::Empty => write!(f, "Mesh contains no triangles"),
            MeshError::UnknownBuiltin(name) => write!(f, "Unknown builtin mesh '{}'", name),
            MeshError::GridTooLarge { cols, rows } => write!(
                f,
                "Grid {}x{} exceeds {} vertices",
                cols,
                rows,
                crate::mesh::MAX_GRID_VERTICES
            ),
        }
    }
}

impl std::error::Error for MeshError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MeshError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors that can occur during texture loading.
#[derive(Debug)]
pub enum TextureError {
    /// Failed to load image file.
    ImageLoad(image::ImageError),
    /// Failed to read file from disk.
    Io(std::io::Error),
}

impl fmt::Display for TextureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureError::ImageLoad(e) => write!(f, "Failed to load image: {}", e),
            TextureError::Io(e) => write!(f, "Failed to read texture file: {}", e),
        }
    }
}

impl std::error::Error for TextureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TextureError::ImageLoad(e) => Some(e),
            TextureError::Io(e) => Some(e),
        }
    }
}

impl From<image::ImageError> for TextureError {
    fn from(e: image::ImageError) -> Self {
        TextureError::ImageLoad(e)
    }
}

impl From<std::io::Error> for TextureError {
    fn from(e: std::io::Error) -> Self {
        TextureError::Io(e)
    }
}

/// Errors that can occur while loading a scene description.
#[derive(Debug)]
pub enum SceneError {
    /// Failed to read the scene file.
    Io { path: PathBuf, source: std::io::Error },
    /// The scene file is not valid JSON or misses required fields.
    Parse(serde_json::Error),
    /// A mesh references a shader the scene does not declare.
    UnknownShader { mesh: String, shader: String },
    /// A mesh file failed to load.
    Mesh { path: String, source: MeshError },
    /// A cloth mesh failed topology validation.
    Topology { path: String, source: TopologyError },
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneError::Io { path, source } => {
                write!(f, "Failed to read scene {}: {}", path.display(), source)
            }
            SceneError::Parse(e) => write!(f, "Invalid scene description: {}", e),
            SceneError::UnknownShader { mesh, shader } => {
                write!(f, "Mesh '{}' uses undeclared shader '{}'", mesh, shader)
            }
            SceneError::Mesh { path, source } => write!(f, "Mesh '{}': {}", path, source),
            SceneError::Topology { path, source } => write!(f, "Cloth '{}': {}", path, source),
        }
    }
}

impl std::error::Error for SceneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SceneError::Io { source, .. } => Some(source),
            SceneError::Parse(e) => Some(e),
            SceneError::Mesh { source, .. } => Some(source),
            SceneError::Topology { source, .. } => Some(source),
            SceneError::UnknownShader { .. } => None,
        }
    }
}

impl From<serde_json::Error> for SceneError {
    fn from(e: serde_json::Error) -> Self {
        SceneError::Parse(e)
    }
}

/// Errors that can occur while reading or writing simulation parameters.
#[derive(Debug)]
pub enum ParamsError {
    /// Failed to read or write the parameter file.
    Io(std::io::Error),
    /// The file is not a valid parameter document.
    Parse(serde_json::Error),
    /// A field holds a value the solver cannot run with.
    Invalid(&'static str),
}

impl fmt::Display for ParamsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamsError::Io(e) => write!(f, "Parameter file I/O failed: {}", e),
            ParamsError::Parse(e) => write!(f, "Invalid parameter file: {}", e),
            ParamsError::Invalid(msg) => write!(f, "Invalid simulation parameters: {}", msg),
        }
    }
}

impl std::error::Error for ParamsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParamsError::Io(e) => Some(e),
            ParamsError::Parse(e) => Some(e),
            ParamsError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ParamsError {
    fn from(e: std::io::Error) -> Self {
        ParamsError::Io(e)
    }
}

impl From<serde_json::Error> for ParamsError {
    fn from(e: serde_json::Error) -> Self {
        ParamsError::Parse(e)
    }
}

/// Errors surfaced by a simulation step.
#[derive(Debug)]
pub enum SolverError {
    /// Kernels failed to build; the step was skipped.
    Faulted(String),
    /// Device work failed during the step.
    Gpu(GpuError),
    /// The step was called with parameters it cannot integrate.
    Params(ParamsError),
    /// A cloth needs more workgroups than one dispatch dimension allows.
    TooManyVertices { name: String, vertices: u32, max_vertices: u64 },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::Faulted(msg) => write!(f, "Solver is faulted: {}", msg),
            SolverError::Gpu(e) => write!(f, "Solver GPU error: {}", e),
            SolverError::Params(e) => write!(f, "Step rejected: {}", e),
            SolverError::TooManyVertices { name, vertices, max_vertices } => write!(
                f,
                "Cloth '{}' has {} vertices; this device dispatches at most {}",
                name, vertices, max_vertices
            ),
        }
    }
}

impl std::error::Error for SolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SolverError::Gpu(e) => Some(e),
            SolverError::Params(e) => Some(e),
            SolverError::Faulted(_) | SolverError::TooManyVertices { .. } => None,
        }
    }
}

impl From<GpuError> for SolverError {
    fn from(e: GpuError) -> Self {
        SolverError::Gpu(e)
    }
}

impl From<ParamsError> for SolverError {
    fn from(e: ParamsError) -> Self {
        SolverError::Params(e)
    }
}

/// Errors that can occur when running the application.
#[derive(Debug)]
pub enum AppError {
    /// Failed to create event loop.
    EventLoop(winit::error::EventLoopError),
    /// Failed to create window.
    Window(winit::error::OsError),
    /// GPU initialization failed.
    Gpu(GpuError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::EventLoop(e) => write!(f, "Failed to create event loop: {}", e),
            AppError::Window(e) => write!(f, "Failed to create window: {}", e),
            AppError::Gpu(e) => write!(f, "GPU error: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::EventLoop(e) => Some(e),
            AppError::Window(e) => Some(e),
            AppError::Gpu(e) => Some(e),
        }
    }
}

impl From<winit::error::EventLoopError> for AppError {
    fn from(e: winit::error::EventLoopError) -> Self {
        AppError::EventLoop(e)
    }
}

impl From<winit::error::OsError> for AppError {
    fn from(e: winit::error::OsError) -> Self {
        AppError::Window(e)
    }
}

impl From<GpuError> for AppError {
    fn from(e: GpuError) -> Self {
        AppError::Gpu(e)
    }
}
