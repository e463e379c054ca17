//! Step handler catalog

pub mod builtin;
pub mod highlevel;

use std::sync::Arc;

use crate::registry::StepRegistry;

/// Registry with every built-in and high-level step registered.
pub fn default_registry() -> StepRegistry {
    let mut registry = StepRegistry::new();

    // navigation
    registry.register(Arc::new(builtin::GotoHandler));
    registry.register(Arc::new(builtin::BackHandler));
    registry.register(Arc::new(builtin::ReloadHandler));
    // interaction
    registry.register(Arc::new(builtin::ClickHandler));
    registry.register(Arc::new(builtin::DblClickHandler));
    registry.register(Arc::new(builtin::FillHandler));
    registry.register(Arc::new(builtin::PressHandler));
    registry.register(Arc::new(builtin::CheckHandler));
    registry.register(Arc::new(builtin::UncheckHandler));
    registry.register(Arc::new(builtin::SelectOptionHandler));
    registry.register(Arc::new(builtin::ScrollHandler));
    registry.register(Arc::new(builtin::ScrollIntoViewHandler));
    // waits
    registry.register(Arc::new(builtin::WaitForHandler));
    registry.register(Arc::new(builtin::WaitForVisibleHandler));
    registry.register(Arc::new(builtin::WaitForHiddenHandler));
    registry.register(Arc::new(builtin::WaitForNetworkIdleHandler));
    // assertions
    registry.register(Arc::new(builtin::ExpectVisibleHandler));
    registry.register(Arc::new(builtin::ExpectHiddenHandler));
    registry.register(Arc::new(builtin::ExpectTextHandler));
    registry.register(Arc::new(builtin::ExpectUrlHandler));
    // capture
    registry.register(Arc::new(builtin::StoreTextHandler));
    registry.register(Arc::new(builtin::StoreAttrHandler));
    // debug
    registry.register(Arc::new(builtin::ScreenshotHandler));
    registry.register(Arc::new(builtin::LogHandler));
    registry.register(Arc::new(builtin::DumpDomHandler));
    // session
    registry.register(Arc::new(builtin::UseStorageStateHandler));
    registry.register(Arc::new(builtin::SaveStorageStateHandler));
    // high-level
    registry.register(Arc::new(builtin::WaitForToastHandler));
    registry.register(Arc::new(builtin::AssertNoConsoleErrorHandler));
    registry.register(Arc::new(builtin::ApiMockHandler));
    registry.register(Arc::new(builtin::RouteStubHandler));
    registry.register(Arc::new(highlevel::SelectOverlayOptionHandler));
    registry.register(Arc::new(highlevel::SelectWijmoComboHandler));
    registry.register(Arc::new(highlevel::ClickWijmoGridCellHandler));
    registry.register(Arc::new(highlevel::SetDatePickerHandler));
    registry.register(Arc::new(highlevel::UploadFileHandler));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every documented built-in resolves to a handler.
    #[test]
    fn registry_is_total_over_documented_steps() {
        let registry = default_registry();
        let expected = [
            "goto",
            "back",
            "reload",
            "click",
            "dblclick",
            "fill",
            "press",
            "check",
            "uncheck",
            "selectOption",
            "scroll",
            "scrollIntoView",
            "waitFor",
            "waitForVisible",
            "waitForHidden",
            "waitForNetworkIdle",
            "expectVisible",
            "expectHidden",
            "expectText",
            "expectUrl",
            "storeText",
            "storeAttr",
            "screenshot",
            "log",
            "dumpDom",
            "useStorageState",
            "saveStorageState",
            "waitForToast",
            "assertNoConsoleError",
            "apiMock",
            "routeStub",
            "selectOverlayOption",
            "selectWijmoCombo",
            "clickWijmoGridCell",
            "setDatePicker",
            "uploadFile",
        ];
        for name in expected {
            assert!(registry.get(name).is_ok(), "missing handler: {}", name);
        }
        let listed = registry.names();
        for name in expected {
            assert!(listed.iter().any(|n| n == name), "not listed: {}", name);
        }
    }

    #[test]
    fn unknown_step_error_names_the_registry() {
        let registry = default_registry();
        let err = match registry.get("flyToTheMoon") {
            Err(e) => e,
            Ok(_) => panic!("expected error for unknown step"),
        };
        let text = err.to_string();
        assert!(text.contains("flyToTheMoon"));
        assert!(text.contains("click"));
    }

    #[test]
    fn plugin_registration_is_indistinguishable() {
        use crate::driver::Driver;
        use crate::registry::{StepContext, StepHandler, StepInfo};
        use async_trait::async_trait;
        use serde_yaml::Mapping;

        struct NoopHandler;

        #[async_trait]
        impl StepHandler for NoopHandler {
            async fn execute(
                &self,
                _driver: &dyn Driver,
                _params: &Mapping,
                _ctx: &mut StepContext<'_>,
            ) -> flowreplay_common::Result<()> {
                Ok(())
            }
            fn validate(&self, _params: &Mapping) -> flowreplay_common::Result<()> {
                Ok(())
            }
            fn info(&self) -> StepInfo {
                StepInfo {
                    name: "customNoop",
                    description: "does nothing",
                    category: "plugin",
                }
            }
        }

        let mut registry = default_registry();
        registry.register(std::sync::Arc::new(NoopHandler));
        assert!(registry.get("customNoop").is_ok());
        assert!(registry.list().iter().any(|i| i.name == "customNoop"));
    }
}
