/*!
 # devport

 Port allocation and development-server lifecycle management for an
 educational IDE.

 ## Overview

 devport provides functionality to:
 - Hand out unique ports to simulated development servers, honoring
   preferences, framework conventions and what worked well before
 - Drive each server through a start/stop/restart lifecycle with logs
 - Simulate framework-specific builds and startup output
 - Refresh health and traffic metrics of running servers periodically
 - Publish every lifecycle and allocation event to subscribers

 ## Basic Usage

 ```no_run
 use devport::{Framework, HealthMonitor, Result, ServerRequest, ServiceLifecycleManager};
 use std::sync::Arc;

 #[tokio::main]
 async fn main() -> Result<()> {
     // Create a manager from a config file
     let manager = Arc::new(ServiceLifecycleManager::from_config_file("devport.yaml")?);

     // Watch what happens
     let mut events = manager.subscribe();

     // Create a server; the port is chosen for us
     let launch = manager
         .create_server(ServerRequest::new("todo-app", Framework::React))
         .await?;
     println!("Running on {}", launch.service.url());
     for insight in &launch.insights {
         println!("  {}", insight);
     }

     // Keep health and metrics current in the background
     let mut monitor = HealthMonitor::for_manager(Arc::clone(&manager));
     monitor.start()?;

     while let Ok(event) = events.recv().await {
         println!("{} {:?}", event.kind, event.port);
     }

     monitor.stop()?;
     manager.shutdown().await
 }
 ```

 ## Features

 - **Port Allocation**: Preference, framework convention, history reuse and range fallback
 - **Lifecycle**: A checked state machine for every server
 - **Configuration**: JSON or YAML config files
 - **Events**: Broadcast channel with bounded replay history
 - **Async Support**: Full async/await support on tokio
*/

pub mod config;
pub mod error;
pub mod events;
pub mod framework;
pub mod port;
pub mod server;

pub use config::{ManagerConfig, ServerRequest};
pub use error::{Error, Result};
pub use events::{Event, EventBus, EventKind};
pub use framework::Framework;
pub use port::{Insight, PortAllocationEngine};
pub use server::{
    HealthMonitor, Service, ServiceId, ServiceLifecycleManager, ServiceStatus,
};
