#![allow(clippy::module_name_repetitions)]
//! Build pipeline: stage supervisor + build file, build the image, clean up.

pub mod dockerfile;
pub mod staging;

use std::path::PathBuf;

use crate::diagnostics::DiagnosticSink;
use crate::docker::{BuildSpec, ContainerRuntime};
use crate::errors::ReconcileError;
use crate::session::Session;

pub struct BuildPipeline<'a, R: ContainerRuntime + ?Sized> {
    runtime: &'a R,
    sink: &'a dyn DiagnosticSink,
    supervisor_source: Option<PathBuf>,
}

impl<'a, R: ContainerRuntime + ?Sized> BuildPipeline<'a, R> {
    pub fn new(
        runtime: &'a R,
        sink: &'a dyn DiagnosticSink,
        supervisor_source: Option<PathBuf>,
    ) -> Self {
        BuildPipeline {
            runtime,
            sink,
            supervisor_source,
        }
    }

    /// Build `session.image_name` from the synthesized build file.
    ///
    /// Staged artifacts this call created are removed before returning, on success and on
    /// failure alike.
    #[tracing::instrument(level = "info", skip_all, fields(image = %session.image_name))]
    pub fn build(&self, session: &Session, post_create_steps: &[String]) -> Result<(), ReconcileError> {
        // Declared first so it is dropped last, after the files inside it.
        let dir = staging::StagingDir::prepare(&session.config_dir)?;
        let supervisor = staging::stage_supervisor(dir.path(), self.supervisor_source.as_deref())?;
        if !supervisor.owned() {
            self.sink.note(&format!(
                "using existing {} from {}",
                staging::SUPERVISOR_FILE,
                dir.path().display()
            ));
        }
        let build_file = staging::stage_dockerfile(dir.path(), post_create_steps)?;
        if !build_file.owned() {
            self.sink.note(&format!(
                "using user-authored {} (no ownership marker); post-create steps not injected",
                build_file.path().display()
            ));
        }

        let mut build_args = vec![("BASE_IMAGE".to_string(), session.base_image.clone())];
        if let Some(user) = session.remote_user.as_deref() {
            build_args.push(("USERNAME".to_string(), user.to_string()));
        }
        let spec = BuildSpec {
            dockerfile: build_file.path().to_path_buf(),
            tag: session.image_name.clone(),
            build_args,
            context: dir.path().to_path_buf(),
        };
        self.sink.note(&format!(
            "building image {} from {}",
            spec.tag, session.base_image
        ));
        self.runtime.build(&spec)?;
        tracing::info!(image = %spec.tag, "image built");
        Ok(())
    }
}
