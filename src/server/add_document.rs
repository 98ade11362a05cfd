use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddDocumentParams {
    #[schemars(description = "Text to embed and add to the knowledge base")]
    pub content: String,

    #[schemars(
        description = "Split long content into chunks before embedding. Defaults to true."
    )]
    pub chunk: Option<bool>,

    #[schemars(description = "Where the content came from (file name, URL), returned with search hits")]
    pub source: Option<String>,
}
