//! true / false — Exit 0 or 1.

use async_trait::async_trait;
use pipesh_types::ToolSchema;

use crate::tools::{Builtin, ExecContext, StageIo};

pub struct True;

#[async_trait]
impl Builtin for True {
    fn name(&self) -> &str {
        "true"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("true", "Do nothing, successfully")
    }

    async fn invoke(&self, _args: &[String], _io: &mut StageIo, _ctx: &mut ExecContext) -> i32 {
        0
    }
}

pub struct False;

#[async_trait]
impl Builtin for False {
    fn name(&self) -> &str {
        "false"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("false", "Do nothing, unsuccessfully")
    }

    async fn invoke(&self, _args: &[String], _io: &mut StageIo, _ctx: &mut ExecContext) -> i32 {
        1
    }
}
