use crate::error::ServiceError;
use async_trait::async_trait;

/// External text-generation service: one prompt in, one completion out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        (**self).generate(prompt).await
    }
}
