use napi::bindgen_prelude::Result as NapiResult;
use napi_derive::napi;
use serde_json::Value;

use crate::config::{parse_config, HashToolsConfig, ToolContext};
use crate::error::HashToolError;
use crate::tools::{tool_list, HashTools};
use crate::{edit, logging, read, search};

fn to_napi_error(error: HashToolError) -> napi::Error {
    napi::Error::from_reason(format!("[{}] {error}", error.code()))
}

#[napi(js_name = "HashTools")]
pub struct HashToolsBinding {
    tools: HashTools,
}

#[napi]
impl HashToolsBinding {
    #[napi(constructor)]
    pub fn new(worktree: String, config: Option<Value>) -> NapiResult<Self> {
        logging::init();
        let config = match config {
            Some(value) => parse_config(&value).map_err(to_napi_error)?,
            None => HashToolsConfig::default(),
        };

        Ok(Self {
            tools: HashTools::new(ToolContext::with_config(worktree, config)),
        })
    }

    #[napi]
    pub fn read(&self, args: Value) -> NapiResult<String> {
        self.tools.invoke(read::TOOL_NAME, args).map_err(to_napi_error)
    }

    #[napi]
    pub fn grep(&self, args: Value) -> NapiResult<String> {
        self.tools.invoke(search::TOOL_NAME, args).map_err(to_napi_error)
    }

    #[napi]
    pub fn edit(&self, args: Value) -> NapiResult<String> {
        self.tools.invoke(edit::TOOL_NAME, args).map_err(to_napi_error)
    }

    #[napi]
    pub fn invoke(&self, tool: String, args: Value) -> NapiResult<String> {
        self.tools.invoke(&tool, args).map_err(to_napi_error)
    }

    #[napi(js_name = "getToolList")]
    pub fn get_tool_list(&self) -> Value {
        Value::Array(tool_list(&self.tools.context().config))
    }
}
