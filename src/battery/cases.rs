//! 固定的测试用例表，所有提交共用

use crate::models::TestCase;

/// 后端接口检查
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCheck {
    ListRecipes,
    GetById,
    NotFound,
    CreateValid,
    RejectInvalid,
    CreatedVisible,
    MalformedId,
    Greeting,
}

/// 后端测试用例，顺序即执行顺序
pub const API_TEST_CASES: &[TestCase<ApiCheck>] = &[
    TestCase {
        name: "GET /api/recipes - list recipes",
        weight: 15,
        check: ApiCheck::ListRecipes,
    },
    TestCase {
        name: "GET /api/recipes/:id - get recipe by id",
        weight: 15,
        check: ApiCheck::GetById,
    },
    TestCase {
        name: "GET /api/recipes/:id - 404 on unknown id",
        weight: 10,
        check: ApiCheck::NotFound,
    },
    TestCase {
        name: "POST /api/recipes - create valid recipe",
        weight: 20,
        check: ApiCheck::CreateValid,
    },
    TestCase {
        name: "POST /api/recipes - reject invalid payloads",
        weight: 15,
        check: ApiCheck::RejectInvalid,
    },
    TestCase {
        name: "Data persistence - created recipe is listed",
        weight: 10,
        check: ApiCheck::CreatedVisible,
    },
    TestCase {
        name: "Error handling - malformed id",
        weight: 10,
        check: ApiCheck::MalformedId,
    },
    // 只做记录，不计分
    TestCase {
        name: "GET / - greeting",
        weight: 0,
        check: ApiCheck::Greeting,
    },
];

/// 前端页面检查
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCheck {
    FetchesRecipes,
    RendersCards,
    ShowsDynamicData,
}

pub const UI_TEST_CASES: &[TestCase<UiCheck>] = &[
    TestCase {
        name: "Frontend - page fetches /api/recipes",
        weight: 5,
        check: UiCheck::FetchesRecipes,
    },
    TestCase {
        name: "Frontend - recipe cards rendered",
        weight: 5,
        check: UiCheck::RendersCards,
    },
    TestCase {
        name: "Frontend - cards show dynamic data",
        weight: 5,
        check: UiCheck::ShowsDynamicData,
    },
];

pub fn total_weight<C>(cases: &[TestCase<C>]) -> u32 {
    cases.iter().map(|c| c.weight).sum()
}

pub fn case_names<C>(cases: &[TestCase<C>]) -> Vec<String> {
    cases.iter().map(|c| c.name.to_string()).collect()
}
