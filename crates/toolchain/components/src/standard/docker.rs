//! Container runtime component

use crate::charts::{ChartCatalog, ChartSource};
use crate::component::Component;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use async_trait::async_trait;

pub const COMPONENT: &str = "docker";

const CHART: ChartSource = ChartSource::new(COMPONENT, "20.10.22");

/// In-namespace docker daemon used by the build workflows.
#[derive(Debug, Clone)]
pub struct Docker {
    catalog: ChartCatalog,
}

impl Docker {
    pub fn new(catalog: ChartCatalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Component for Docker {
    async fn install(&self, dispatcher: &dyn Dispatcher, _namespace: &str) -> Result<()> {
        dispatcher.install_chart(&self.catalog.release(&CHART)).await?;
        Ok(())
    }

    async fn upgrade(&self, dispatcher: &dyn Dispatcher, _namespace: &str) -> Result<()> {
        dispatcher.upgrade_chart(&self.catalog.release(&CHART)).await?;
        Ok(())
    }

    async fn rollback(&self, dispatcher: &dyn Dispatcher, _namespace: &str) -> Result<()> {
        dispatcher
            .rollback_release(&self.catalog.release(&CHART))
            .await?;
        Ok(())
    }

    async fn uninstall(&self, dispatcher: &dyn Dispatcher, _namespace: &str) -> Result<()> {
        dispatcher.uninstall_chart(COMPONENT).await?;
        Ok(())
    }
}
